//! GlobalPlatform card management for jcbench
//!
//! This crate provides the SCP02 "i=55" secure channel, the CAP archive
//! reader and the Security Domain command sequences used to load, install
//! and remove Java Card packages, all speaking through the `Channel`
//! capability of `jcbench-apdu-core`.

pub mod cap;
pub mod commands;
pub mod constants;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod secure_channel;
pub mod session;
pub mod util;

// Re-exports
pub use cap::{CapFile, Component};
pub use domain::SecurityDomain;
pub use error::{Error, Result};
pub use secure_channel::{InitUpdateResponse, Scp02, SecureLevel};
pub use session::{KeySet, SessionKeys, default_keysets};
