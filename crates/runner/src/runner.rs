//! Repeat loop

use std::time::Instant;

use contracts::ScenarioConfig;
use observability::{IterationAggregator, SnapshotDumper};
use tracing::{error, info};

use crate::iteration::{pipeline_name, Iteration};
use crate::report::{IterationReport, RunSummary};

/// Runs the iteration state machine `config.iterations` times, stopping at
/// the first iteration that fails.
#[derive(Debug, Clone)]
pub struct Runner {
    config: ScenarioConfig,
    dumper: Option<SnapshotDumper>,
}

impl Runner {
    pub fn new(config: ScenarioConfig) -> Self {
        let dumper = config.diagnostics_dir.clone().map(SnapshotDumper::new);
        Self { config, dumper }
    }

    /// Run a single iteration
    pub async fn run_once(&self, index: u64) -> IterationReport {
        match Iteration::prepare(index, &self.config, self.dumper.clone()) {
            Ok(iteration) => iteration.run().await,
            Err(e) => {
                error!(index, error = %e, "failed to set up iteration");
                IterationReport::setup_failed(index, pipeline_name(index), e)
            }
        }
    }

    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let requested = self.config.iterations;
        let mut stats = IterationAggregator::new();
        let mut executed = 0;
        let mut failed = None;

        info!(
            iterations = requested,
            branches = self.config.branch_count,
            quota = self.config.quota,
            attach_mode = ?self.config.attach_mode,
            "starting stress run"
        );

        for index in 0..requested {
            let report = self.run_once(index).await;
            executed += 1;

            observability::record_iteration(report.outcome, report.elapsed);
            observability::record_units_consumed(report.units_consumed);
            stats.update(report.outcome, report.elapsed, report.units_consumed);

            if !report.is_success() {
                error!(
                    index,
                    pipeline = %report.pipeline_name,
                    outcome = %report.outcome,
                    error = ?report.failure.as_ref().map(ToString::to_string),
                    "iteration failed, aborting run"
                );
                failed = Some(report);
                break;
            }

            if (index + 1) % 100 == 0 {
                info!(done = index + 1, total = requested, "progress");
            }
        }

        RunSummary {
            requested,
            executed,
            failed,
            elapsed: started.elapsed(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RunOutcome, SourceSettings};

    fn config(iterations: u64) -> ScenarioConfig {
        ScenarioConfig {
            iterations,
            branch_count: 3,
            quota: 2,
            attach_interval_ms: 0,
            watchdog_timeout_ms: 10_000,
            source: SourceSettings {
                unit_interval_us: 200,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_repeats_requested_iterations() {
        let summary = Runner::new(config(3)).run().await;
        assert!(summary.is_success());
        assert_eq!(summary.executed, 3);
        assert_eq!(summary.stats.summary().completed, 3);
    }

    #[tokio::test]
    async fn test_aborts_on_first_failure() {
        let mut config = config(5);
        config.quota = u64::MAX;
        config.watchdog_timeout_ms = 100;

        let summary = Runner::new(config).run().await;
        assert!(!summary.is_success());
        assert_eq!(summary.executed, 1);
        let failed = summary.failed.unwrap();
        assert_eq!(failed.outcome, RunOutcome::Timeout);
        assert_eq!(failed.pipeline_name, "tee_test_0");
    }
}
