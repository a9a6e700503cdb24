//! Wire representation of a delay measurement
//!
//! The device answers a one-byte `m` command differently on each link:
//!
//! - Serial: up to 16 raw bytes holding a native-endian IEEE-754 `f32`.
//!   Short responses are zero-padded on the left to 4 bytes before
//!   decoding, matching the device's habit of truncating the frame.
//! - UDP: one datagram carrying the decimal text of the value.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::{LinkError, Result};

/// Command byte that triggers a measurement
pub const MEASURE_COMMAND: u8 = b'm';

/// Width of the float carried in a serial frame
pub const FLOAT_WIDTH: usize = 4;

/// Largest serial response read per measurement
pub const MAX_SERIAL_FRAME: usize = 16;

/// Largest reply datagram accepted on the wireless link
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// A single delay measurement reported by the device
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delay(f32);

impl Delay {
    /// Wrap a raw value
    pub fn new(value: f32) -> Self {
        Self(value)
    }

    /// The measured value
    pub fn as_f32(&self) -> f32 {
        self.0
    }
}

impl From<f32> for Delay {
    fn from(value: f32) -> Self {
        Self(value)
    }
}

impl From<Delay> for f32 {
    fn from(delay: Delay) -> Self {
        delay.0
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Policy for serial responses longer than one float
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePolicy {
    /// Decode the last 4 bytes of the response
    #[default]
    TrailingWord,
    /// Reject any response longer than 4 bytes
    Strict,
}

/// Decode a serial response into a delay
///
/// Responses shorter than [`FLOAT_WIDTH`] are left-padded with zero bytes.
/// Responses between 5 and [`MAX_SERIAL_FRAME`] bytes are handled by
/// `policy`; anything longer is always rejected.
pub fn decode_serial_frame(raw: &[u8], policy: FramePolicy) -> Result<Delay> {
    if raw.len() > MAX_SERIAL_FRAME {
        return Err(LinkError::FrameTooLong {
            len: raw.len(),
            max: MAX_SERIAL_FRAME,
        });
    }

    let mut word = [0u8; FLOAT_WIDTH];
    if raw.len() > FLOAT_WIDTH {
        match policy {
            FramePolicy::Strict => {
                return Err(LinkError::AmbiguousFrame { len: raw.len() });
            }
            FramePolicy::TrailingWord => {
                warn!(
                    len = raw.len(),
                    "Oversized serial frame, decoding trailing word"
                );
                word.copy_from_slice(&raw[raw.len() - FLOAT_WIDTH..]);
            }
        }
    } else {
        if raw.len() < FLOAT_WIDTH {
            warn!(len = raw.len(), "Short serial frame, zero-padding");
        }
        word[FLOAT_WIDTH - raw.len()..].copy_from_slice(raw);
    }

    Ok(Delay(f32::from_ne_bytes(word)))
}

/// Encode a delay the way the device puts it on the serial link
pub fn encode_serial_frame(delay: Delay) -> [u8; FLOAT_WIDTH] {
    delay.0.to_ne_bytes()
}

/// Decode a reply datagram into a delay
///
/// Surrounding whitespace and NUL padding are ignored.
pub fn decode_datagram(payload: &[u8]) -> Result<Delay> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| LinkError::MalformedPayload(format!("not UTF-8: {}", e)))?;
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    trimmed
        .parse::<f32>()
        .map(Delay)
        .map_err(|_| LinkError::MalformedPayload(format!("not a number: {:?}", trimmed)))
}

/// Encode a delay the way the device puts it in a reply datagram
pub fn encode_datagram(delay: Delay) -> Vec<u8> {
    delay.0.to_string().into_bytes()
}
