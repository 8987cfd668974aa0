//! Suite driver
//!
//! Discovers case descriptions, opens the card channel once and runs every
//! case against it in discovery order. One case's failure never aborts the
//! remaining cases.

use std::path::Path;

use tracing::{debug, warn};

use jcbench_apdu_core::{Channel, ProtocolPreference};

use crate::case::MeasureCase;
use crate::config;
use crate::context::Context;
use crate::error::Result;
use crate::reporter::Reporter;

/// Runs every discovered case against a single card channel.
#[derive(Debug)]
pub struct Driver {
    cases: Vec<MeasureCase>,
}

impl Driver {
    /// Load all case descriptions under a directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let cases = config::discover_cases(dir.as_ref())?;
        debug!(count = cases.len(), "driver initialized");
        Ok(Self { cases })
    }

    /// Cases in discovery order.
    pub fn cases(&self) -> &[MeasureCase] {
        &self.cases
    }

    /// Open the channel, run every case, close the channel, and return the
    /// filled reporter.
    pub fn run<C: Channel>(&self, channel: C) -> Result<Reporter> {
        let mut ctx = Context::new(channel);

        // T=0 keeps waiting-time extensions short, which matters when
        // timing single exchanges; fall back to whatever the card offers
        if ctx.transport.open(ProtocolPreference::T0).is_err() {
            ctx.transport.open(ProtocolPreference::Any)?;
        }

        for case in &self.cases {
            case.run(&mut ctx);
        }

        if let Err(e) = ctx.transport.close() {
            warn!(error = %e, "closing the channel failed");
        }
        Ok(ctx.reporter)
    }
}
