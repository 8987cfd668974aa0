//! Error type for GlobalPlatform operations

use jcbench_apdu_core::{ChannelError, CodecError, StatusWord};
use thiserror::Error;

/// Result type for GlobalPlatform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GlobalPlatform operations
#[derive(Debug, Error)]
pub enum Error {
    /// APDU encoding errors
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Channel and transport errors
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A Security Domain operation expected 90 00 and got something else
    #[error("{operation} failed with status {status}")]
    Status {
        /// Name of the originating operation
        operation: &'static str,
        /// Status word returned by the card
        status: StatusWord,
    },

    /// Mutual authentication could not be completed
    #[error("card authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// The card's cryptogram did not match the expected value
    #[error("card cryptogram mismatch")]
    CryptogramMismatch,

    /// The card negotiated a secure channel protocol other than SCP02
    #[error("unsupported SCP version: {0}")]
    UnsupportedScpVersion(u8),

    /// The card requested a key version no key set is defined for
    #[error("key version {0:#04x} is not defined")]
    UndefinedKeyVersion(u8),

    /// A secure-channel operation was invoked before authentication
    #[error("secure channel is not established")]
    NotAuthenticated,

    /// The requested secure level is recognized but not implemented
    #[error("secure level {0:#04x} is not supported")]
    UnsupportedSecureLevel(u8),

    /// Unpadding found a byte that is neither zero fill nor the marker
    #[error("padding is not valid ISO 9797-1 method 2")]
    Padding,

    /// A cryptographic primitive was invoked with unusable input
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// Command data cannot grow by a MAC without overflowing Lc
    #[error("command data of {0} bytes is too long to MAC")]
    DataTooLong(usize),

    /// Value too long for the length-value encoding
    #[error("value of {0} bytes does not fit a length-value encoding")]
    LvTooLong(usize),

    /// CAP archive could not be read or is inconsistent
    #[error("CAP file error: {0}")]
    CapFile(&'static str),

    /// I/O error while reading a CAP archive
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
