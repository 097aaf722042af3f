//! # Runner
//!
//! Drives the stress iterations: start the pipeline, attach branches on a
//! schedule, react to bus messages and quota crossings on one event loop,
//! enforce the watchdog, tear down, repeat.

mod context;
mod iteration;
mod report;
mod runner;
mod schedule;
mod watchdog;

pub use context::RunContext;
pub use iteration::{pipeline_name, Iteration};
pub use report::{IterationReport, RunSummary};
pub use runner::Runner;
pub use schedule::AttachSchedule;
pub use watchdog::Watchdog;
