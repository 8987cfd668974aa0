//! Core APDU types for jcbench
//!
//! This crate provides the ISO/IEC 7816-4 command and response value types,
//! application identifiers, the `Channel` capability trait abstracting the
//! physical reader, and the response-chaining transport that hides T=0
//! GET RESPONSE / wrong-length retries from higher layers.

pub mod aid;
pub mod command;
pub mod error;
pub mod response;
pub mod transport;

pub use aid::Aid;
pub use command::{ApduCase, CommandApdu};
pub use error::{ChannelError, CodecError};
pub use response::{ResponseApdu, StatusWord};
pub use transport::{ChainingTransport, Channel, Protocol, ProtocolPreference, ResetKind};
