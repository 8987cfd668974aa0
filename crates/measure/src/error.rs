//! Error type for the measurement engine

use thiserror::Error;

/// Result type for the measurement engine
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the measurement engine
#[derive(Debug, Error)]
pub enum Error {
    /// A case description used an action name outside the recognized set
    #[error("unrecognized action name in {0:?}")]
    UnknownAction(String),

    /// A recognized action received a malformed argument list
    #[error("malformed action arguments in {0:?}")]
    MalformedAction(String),

    /// A case description selected an unrecognized result transform
    #[error("unrecognized result transform {0:?}")]
    UnknownTransform(String),

    /// A CAP archive declares no applets to install
    #[error("CAP file declares no applets")]
    NoApplets,

    /// Errors from the Security Domain layer
    #[error(transparent)]
    GlobalPlatform(#[from] jcbench_globalplatform::Error),

    /// Channel and transport errors
    #[error(transparent)]
    Channel(#[from] jcbench_apdu_core::ChannelError),

    /// APDU encoding errors
    #[error(transparent)]
    Codec(#[from] jcbench_apdu_core::CodecError),

    /// A case description file is not valid JSON
    #[error("case description error: {0}")]
    Description(#[from] serde_json::Error),

    /// I/O error while reading descriptions or writing the report
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
