//! APDU response definitions

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::error::CodecError;

/// Status word (SW1-SW2) of an APDU response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Success (90 00)
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    /// Create a new status word.
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 << 8 | SW2).
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 << 8 | SW2).
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Check whether this status word indicates success (90 00).
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Check whether more response data is available (61 xx, T=0 only).
    pub const fn is_more_data_available(&self) -> bool {
        self.sw1 == 0x61
    }

    /// Check whether the card reported a wrong Le (6C xx); SW2 carries the
    /// corrected value.
    pub const fn is_wrong_le(&self) -> bool {
        self.sw1 == 0x6C
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Response APDU: raw bytes plus the elapsed time of the exchange that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    bytes: Bytes,
    elapsed: Duration,
}

impl ResponseApdu {
    /// Create a response from raw bytes and the elapsed transmit time.
    ///
    /// Rejects anything shorter than the 2-byte status word.
    pub fn new(bytes: impl Into<Bytes>, elapsed: Duration) -> Result<Self, CodecError> {
        let bytes = bytes.into();
        if bytes.len() < 2 {
            return Err(CodecError::ResponseTooShort(bytes.len()));
        }
        Ok(Self { bytes, elapsed })
    }

    /// Response payload (everything but the trailing status word).
    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 2]
    }

    /// Status word.
    pub fn status(&self) -> StatusWord {
        StatusWord::new(self.sw1(), self.sw2())
    }

    /// First status byte.
    pub fn sw1(&self) -> u8 {
        self.bytes[self.bytes.len() - 2]
    }

    /// Second status byte.
    pub fn sw2(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// Check whether the response indicates success.
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Elapsed time of the exchange, summed over retries when the response
    /// was assembled by the chaining transport.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Full raw bytes including the status word.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the response, returning the raw bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl fmt::Display for ResponseApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.bytes))
    }
}
