//! Iteration and run results

use std::time::Duration;

use contracts::{RunOutcome, RunState, StressError};
use observability::IterationAggregator;

/// Result of one iteration
#[derive(Debug)]
pub struct IterationReport {
    pub index: u64,
    pub pipeline_name: String,
    pub outcome: RunOutcome,
    /// State the controller ended in (`TornDown` unless setup failed)
    pub final_state: RunState,
    /// Branches present in the pipeline, the initial one included
    pub branches_attached: u32,
    pub units_consumed: u64,
    /// Remaining-branch values seen by the loop, starting with the planned count
    pub remaining_trace: Vec<u64>,
    pub elapsed: Duration,
    pub failure: Option<StressError>,
}

impl IterationReport {
    pub fn is_success(&self) -> bool {
        !self.outcome.is_failure()
    }

    /// Report for an iteration whose pipeline could not even be built
    pub(crate) fn setup_failed(index: u64, pipeline_name: String, error: StressError) -> Self {
        Self {
            index,
            pipeline_name,
            outcome: RunOutcome::Error,
            final_state: RunState::Error,
            branches_attached: 0,
            units_consumed: 0,
            remaining_trace: Vec::new(),
            elapsed: Duration::ZERO,
            failure: Some(error),
        }
    }
}

/// Result of the repeat loop
#[derive(Debug)]
pub struct RunSummary {
    pub requested: u64,
    pub executed: u64,
    /// The iteration that aborted the run, if any
    pub failed: Option<IterationReport>,
    pub elapsed: Duration,
    /// Per-outcome counts and iteration durations
    pub stats: IterationAggregator,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_none() && self.executed == self.requested
    }
}
