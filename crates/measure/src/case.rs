//! Measure cases and the timing methodology

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error};

use jcbench_apdu_core::Channel;

use crate::action::Action;
use crate::config::CaseDescription;
use crate::context::Context;
use crate::error::{Error, Result};

/// Closed set of transforms mapping the measured seconds delta to the
/// reported value. Selected by name; configuration never supplies code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultTransform {
    /// `1 / seconds`
    Reciprocal,
    /// `seconds`
    Identity,
    /// `scale / seconds`
    ScaledReciprocal(f64),
}

impl ResultTransform {
    /// Parse a transform selector: `reciprocal`, `identity` or
    /// `scaled-reciprocal <scale>`.
    pub fn parse(selector: &str) -> Result<Self> {
        let unknown = || Error::UnknownTransform(selector.to_owned());
        let mut words = selector.split_whitespace();
        let transform = match (words.next(), words.next(), words.next()) {
            (Some("reciprocal"), None, _) => Self::Reciprocal,
            (Some("identity"), None, _) => Self::Identity,
            (Some("scaled-reciprocal"), Some(scale), None) => {
                Self::ScaledReciprocal(scale.parse().map_err(|_| unknown())?)
            }
            _ => return Err(unknown()),
        };
        Ok(transform)
    }

    /// Apply the transform to a seconds value.
    pub fn apply(self, seconds: f64) -> f64 {
        match self {
            Self::Reciprocal => 1.0 / seconds,
            Self::Identity => seconds,
            Self::ScaledReciprocal(scale) => scale / seconds,
        }
    }
}

/// One benchmark case: four actions plus the measurement parameters.
///
/// Loaded from a description at startup and executed exactly once per run.
#[derive(Debug)]
pub struct MeasureCase {
    /// Case name shown in the report
    pub name: String,
    /// Human-readable description
    pub description: String,
    round: usize,
    transform: ResultTransform,
    unit: String,
    setup: Action,
    teardown: Action,
    adjust: Action,
    test: Action,
}

impl MeasureCase {
    /// Build a case from its on-disk description. The path supplies the
    /// default name and anchors relative CAP paths.
    pub fn from_description(path: &Path, description: CaseDescription) -> Result<Self> {
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            name: description
                .name
                .unwrap_or_else(|| path.display().to_string()),
            description: description.description,
            round: description.round,
            transform: ResultTransform::parse(&description.result)?,
            unit: description.unit,
            setup: Action::compile(base_dir, &description.setup)?,
            teardown: Action::compile(base_dir, &description.teardown)?,
            adjust: Action::compile(base_dir, &description.adjust)?,
            test: Action::compile(base_dir, &description.test)?,
        })
    }

    /// Run the case, reporting the outcome into the context.
    ///
    /// Ordering is fixed: setup once (failures logged, non-fatal), adjust
    /// `round` times, test `round` times only if adjust completed, then
    /// teardown once whatever happened. The reported value is
    /// `transform(min(test) − min(adjust))`: the minimum suppresses jitter
    /// and the subtraction cancels overhead shared by both actions. A case
    /// with an incomplete sample set reports as failed, never as a number.
    pub fn run<C: Channel>(&self, ctx: &mut Context<C>) {
        debug!(name = %self.name, "running measure case");

        if let Err(e) = self.setup.run(ctx) {
            error!(name = %self.name, error = %e, "setup failed");
        }

        let adjust = self.collect_samples(ctx, &self.adjust, "adjust");
        let test = if adjust.is_some() {
            self.collect_samples(ctx, &self.test, "test")
        } else {
            None
        };

        match (floor_sample(adjust), floor_sample(test)) {
            (Some(adjust_floor), Some(test_floor)) => {
                let delta = test_floor.as_secs_f64() - adjust_floor.as_secs_f64();
                let result = self.transform.apply(delta);
                ctx.reporter
                    .report_case(&self.name, &self.description, result, &self.unit);
            }
            _ => ctx.reporter.report_failure(&self.name, &self.description),
        }

        if let Err(e) = self.teardown.run(ctx) {
            error!(name = %self.name, error = %e, "teardown failed");
        }
    }

    fn collect_samples<C: Channel>(
        &self,
        ctx: &mut Context<C>,
        action: &Action,
        phase: &str,
    ) -> Option<Vec<Duration>> {
        let mut samples = Vec::with_capacity(self.round);
        for _ in 0..self.round {
            match action.run(ctx) {
                Ok(elapsed) => samples.push(elapsed),
                Err(e) => {
                    error!(name = %self.name, phase, error = %e, "phase failed");
                    return None;
                }
            }
        }
        Some(samples)
    }
}

fn floor_sample(samples: Option<Vec<Duration>>) -> Option<Duration> {
    samples.and_then(|samples| samples.into_iter().min())
}
