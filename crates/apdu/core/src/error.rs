//! Error types for APDU encoding and channel I/O

use thiserror::Error;

/// Errors raised while constructing or parsing APDU values.
///
/// Malformed input is rejected at construction; values are never silently
/// truncated or coerced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Command APDU shorter than the 4-byte header
    #[error("command apdu must be at least 4 bytes, got {0}")]
    CommandTooShort(usize),

    /// Command APDU length matches none of the ISO 7816-4 cases
    #[error("command apdu of {0} bytes does not match any ISO 7816-4 case")]
    MalformedCommand(usize),

    /// Data field too long even for the extended encoding
    #[error("command data of {0} bytes exceeds the extended length limit")]
    DataTooLong(usize),

    /// Response APDU shorter than the status word
    #[error("response apdu must be at least 2 bytes, got {0}")]
    ResponseTooShort(usize),

    /// AID outside the 5..=16 byte range
    #[error("AID must be 5 to 16 bytes, got {0}")]
    BadAidLength(usize),

    /// Input was not valid hexadecimal
    #[error("invalid hex string")]
    InvalidHex,
}

/// Errors raised by a [`Channel`](crate::transport::Channel) implementation
/// or by the response-chaining transport on top of it.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Operation requires an open channel
    #[error("channel is not open")]
    NotOpen,

    /// The channel was already open
    #[error("channel is already open")]
    AlreadyOpen,

    /// Requested protocol is not available
    #[error("protocol {0} not supported by the reader")]
    UnsupportedProtocol(String),

    /// Device-level failure reported by the reader driver
    #[error("device error: {0}")]
    Device(String),

    /// The physical exchange failed
    #[error("transmission failed: {0}")]
    Transmit(String),

    /// The card returned bytes that do not form a response APDU
    #[error(transparent)]
    Codec(#[from] CodecError),
}
