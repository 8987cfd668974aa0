//! Execution context threaded through actions and cases

use jcbench_apdu_core::{ChainingTransport, Channel};

use crate::reporter::Reporter;

/// Shared state for one measurement run: the transport owning the card
/// channel and the reporter collecting results. The channel is a single
/// serial resource; the context owns it exclusively for the run.
#[derive(Debug)]
pub struct Context<C: Channel> {
    /// Transport the actions exchange APDUs through
    pub transport: ChainingTransport<C>,
    /// Accumulates per-case results
    pub reporter: Reporter,
}

impl<C: Channel> Context<C> {
    /// Create a context from a channel.
    pub fn new(channel: C) -> Self {
        Self {
            transport: ChainingTransport::new(channel),
            reporter: Reporter::new(),
        }
    }
}
