//! jcbench measurement engine
//!
//! Compiles case descriptions into action trees, executes them against a
//! card channel and reports elapsed-time derived results. The timing
//! methodology runs a control ("adjust") action and a measured ("test")
//! action the same number of rounds and subtracts the minimum samples, so
//! fixed exchange overhead cancels out.

pub mod action;
pub mod case;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod reporter;

pub use action::Action;
pub use case::{MeasureCase, ResultTransform};
pub use config::{ActionDesc, CaseDescription};
pub use context::Context;
pub use driver::Driver;
pub use error::{Error, Result};
pub use reporter::Reporter;
