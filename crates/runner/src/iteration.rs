//! One test iteration
//!
//! `Idle -> Running -> (Completed | Error | Timeout) -> TornDown`
//!
//! The loop runs on a single task. Engine threads only reach it through the
//! event channel: bus messages arrive as `LoopEvent::Bus`, quota crossings as
//! `LoopEvent::QuotaReached`. Events are polled before timers so a pending
//! completion check always wins over the next attachment or the watchdog.

use std::sync::Arc;

use async_channel::Receiver;
use branching::{attach_branch, Completion, Pipeline};
use contracts::{
    BusMessage, ElementState, LoopEvent, RunOutcome, RunState, ScenarioConfig, StressError,
};
use observability::SnapshotDumper;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::context::RunContext;
use crate::report::IterationReport;
use crate::schedule::AttachSchedule;
use crate::watchdog::Watchdog;

/// Pipeline name for iteration `index`
pub fn pipeline_name(index: u64) -> String {
    format!("tee_test_{index}")
}

pub struct Iteration {
    index: u64,
    config: ScenarioConfig,
    ctx: RunContext,
    events: Receiver<LoopEvent>,
    state: RunState,
    dumper: Option<SnapshotDumper>,
    outcome: Option<RunOutcome>,
    failure: Option<StressError>,
    trace: Vec<u64>,
}

impl Iteration {
    /// Build the pipeline and hook its bus into the loop's event channel
    pub fn prepare(
        index: u64,
        config: &ScenarioConfig,
        dumper: Option<SnapshotDumper>,
    ) -> Result<Self, StressError> {
        let (tx, rx) = async_channel::unbounded();
        let pipeline = Arc::new(Pipeline::build(pipeline_name(index), config, tx.clone())?);

        let forward = tx.clone();
        pipeline
            .graph()
            .bus()
            .add_watch(move |msg| {
                let _ = forward.try_send(LoopEvent::Bus(msg));
            })
            .map_err(|e| StressError::engine(pipeline.name(), e.to_string()))?;

        let trace = vec![pipeline.tracker().remaining()];
        Ok(Self {
            index,
            config: config.clone(),
            ctx: RunContext::new(tx, pipeline),
            events: rx,
            state: RunState::Idle,
            dumper,
            outcome: None,
            failure: None,
            trace,
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        self.ctx.pipeline()
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Drive the iteration to the end and tear it down
    #[instrument(name = "iteration", skip(self), fields(index = self.index, pipeline = %self.pipeline().name()))]
    pub async fn run(mut self) -> IterationReport {
        let started = Instant::now();
        let pipeline = self.ctx.pipeline().clone();

        self.transition(RunState::Running);
        if let Err(e) = pipeline.graph().set_state(ElementState::Playing) {
            self.finish(
                RunOutcome::Error,
                Some(StressError::engine(pipeline.name(), e.to_string())),
            );
        }

        let mut watchdog = Watchdog::arm(self.config.watchdog_timeout());
        let mut schedule = AttachSchedule::new(
            self.config.attach_mode,
            self.config.attach_interval(),
            self.config.attachments(),
        );
        observability::set_remaining_branches(pipeline.tracker().remaining());

        while !self.ctx.is_stopping() {
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    // Both senders live in `self`; unreachable in practice
                    Err(_) => break,
                },

                () = watchdog.expired() => {
                    let remaining = pipeline.tracker().remaining();
                    error!(remaining, "test timeout on pipeline {}", pipeline.name());
                    self.dump("timeout");
                    self.finish(
                        RunOutcome::Timeout,
                        Some(StressError::Timeout {
                            pipeline: pipeline.name().to_string(),
                            waited_ms: watchdog.elapsed().as_millis() as u64,
                            remaining,
                        }),
                    );
                }

                () = schedule.due(), if !schedule.is_done() => {
                    schedule.advance();
                    self.attach(&pipeline);
                }
            }
        }

        self.teardown(watchdog, &pipeline).await;

        let outcome = self.outcome.unwrap_or(RunOutcome::Completed);
        let report = IterationReport {
            index: self.index,
            pipeline_name: pipeline.name().to_string(),
            outcome,
            final_state: self.state,
            branches_attached: pipeline.branch_count() as u32,
            units_consumed: pipeline.units_consumed(),
            remaining_trace: std::mem::take(&mut self.trace),
            elapsed: started.elapsed(),
            failure: self.failure.take(),
        };

        debug!(
            outcome = %report.outcome,
            branches = report.branches_attached,
            units = report.units_consumed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "iteration finished"
        );
        report
    }

    fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::QuotaReached { branch } => {
                let completion = self.ctx.pipeline().check_and_maybe_complete();
                trace!(%branch, ?completion, "branch reached quota");
                match completion {
                    Completion::Progress(remaining) => {
                        self.trace.push(remaining);
                        observability::set_remaining_branches(remaining);
                    }
                    Completion::Done => {
                        self.trace.push(0);
                        observability::set_remaining_branches(0);
                        debug!("all branches reached quota, terminating");
                        self.finish(RunOutcome::Completed, None);
                    }
                    Completion::AlreadyDone => {}
                }
            }
            LoopEvent::Bus(BusMessage::Error { source, message }) => {
                error!(%source, %message, "error received on bus");
                self.dump("error");
                self.finish(RunOutcome::Error, Some(StressError::engine(source, message)));
            }
            LoopEvent::Bus(BusMessage::Warning { source, message }) => {
                warn!(%source, %message, "warning received on bus");
                self.dump("warning");
            }
            LoopEvent::Bus(BusMessage::Eos { source }) => {
                debug!(%source, "received eos");
                self.finish(RunOutcome::Completed, None);
            }
            LoopEvent::Bus(BusMessage::StateChanged { source, old, new }) => {
                trace!(%source, %old, %new, "state changed");
            }
            LoopEvent::Wakeup => {}
        }
    }

    fn attach(&mut self, pipeline: &Pipeline) {
        match attach_branch(pipeline) {
            Ok(branch) => {
                trace!(%branch, "branch attached");
                observability::record_branch_attached();
            }
            Err(e) => {
                error!(error = %e, "branch attachment failed");
                self.finish(RunOutcome::Error, Some(e.into()));
            }
        }
    }

    /// Record the first terminal outcome and stop the loop
    fn finish(&mut self, outcome: RunOutcome, failure: Option<StressError>) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(outcome);
        self.failure = failure;
        self.transition(outcome.into());

        if outcome.is_failure() {
            self.ctx.fail();
        } else {
            self.ctx.request_stop();
        }
    }

    async fn teardown(&mut self, watchdog: Watchdog, pipeline: &Arc<Pipeline>) {
        if let Err(e) = watchdog.cancel() {
            if self.ctx.has_failed() {
                debug!(error = %e, "watchdog already fired");
            } else {
                error!(error = %e, "error removing watchdog");
                self.outcome = None;
                self.finish(RunOutcome::Error, Some(e));
            }
        }

        // Joins every streaming thread
        let graph = pipeline.graph().clone();
        match tokio::task::spawn_blocking(move || graph.set_state(ElementState::Null)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to stop pipeline"),
            Err(e) => warn!(error = %e, "teardown task failed"),
        }

        if let Err(e) = pipeline.graph().bus().remove_watch() {
            error!(error = %e, "failed to remove bus watch");
            if !self.ctx.has_failed() {
                self.outcome = None;
                self.finish(
                    RunOutcome::Error,
                    Some(StressError::removal_failed("bus watch", e.to_string())),
                );
            }
        }

        self.transition(RunState::TornDown);
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "run state");
            self.state = next;
        }
    }

    fn dump(&self, kind: &str) {
        if let Some(dumper) = &self.dumper {
            if let Some(path) = dumper.dump(&self.ctx.pipeline().snapshot(), kind) {
                info!(path = %path.display(), "graph snapshot written");
            }
        }
    }
}

impl std::fmt::Debug for Iteration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iteration")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SourceSettings;
    use std::time::Duration;

    fn config(branches: u32, quota: u64) -> ScenarioConfig {
        ScenarioConfig {
            iterations: 1,
            branch_count: branches,
            quota,
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
    async fn test_single_branch_single_unit() {
        let iteration = Iteration::prepare(0, &config(1, 1), None).unwrap();
        assert_eq!(iteration.state(), RunState::Idle);

        let report = iteration.run().await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.final_state, RunState::TornDown);
        assert_eq!(report.remaining_trace, vec![1, 0]);
        assert_eq!(report.branches_attached, 1);
        assert!(report.units_consumed >= 1);
        assert!(report.failure.is_none());
    }

    #[tokio::test]
    async fn test_eos_completes() {
        let mut config = config(1, 1_000);
        config.source.num_units = Some(5);

        let report = Iteration::prepare(0, &config, None).unwrap().run().await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.units_consumed, 5);
        assert_eq!(report.remaining_trace, vec![1]);
    }

    #[tokio::test]
    async fn test_timeout_dumps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(2, u64::MAX);
        config.watchdog_timeout_ms = 200;

        let dumper = SnapshotDumper::new(dir.path());
        let report = Iteration::prepare(7, &config, Some(dumper)).unwrap().run().await;

        assert_eq!(report.outcome, RunOutcome::Timeout);
        assert!(report.elapsed >= Duration::from_millis(200));
        assert!(matches!(report.failure, Some(StressError::Timeout { remaining: 2, .. })));

        let dumped: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.contains("-timeout-tee_test_7"))
            .collect();
        assert_eq!(dumped.len(), 2);
    }

    #[tokio::test]
    async fn test_fired_watchdog_fails_completed_iteration() {
        let mut iteration = Iteration::prepare(0, &config(1, 1), None).unwrap();
        let pipeline = iteration.pipeline().clone();
        iteration.finish(RunOutcome::Completed, None);
        assert!(!iteration.ctx.has_failed());

        let mut watchdog = Watchdog::arm(Duration::from_millis(1));
        watchdog.expired().await;
        iteration.teardown(watchdog, &pipeline).await;

        assert_eq!(iteration.outcome, Some(RunOutcome::Error));
        assert!(iteration.ctx.has_failed());
        assert_eq!(iteration.state(), RunState::TornDown);
        assert!(matches!(
            iteration.failure,
            Some(StressError::RemovalFailed { ref resource, .. }) if resource == "watchdog timer"
        ));
    }

    #[tokio::test]
    async fn test_fired_watchdog_keeps_earlier_failure() {
        let mut iteration = Iteration::prepare(0, &config(1, 1), None).unwrap();
        let pipeline = iteration.pipeline().clone();
        iteration.finish(RunOutcome::Timeout, None);

        let mut watchdog = Watchdog::arm(Duration::from_millis(1));
        watchdog.expired().await;
        iteration.teardown(watchdog, &pipeline).await;

        assert_eq!(iteration.outcome, Some(RunOutcome::Timeout));
        assert!(iteration.failure.is_none());
    }

    #[tokio::test]
    async fn test_missing_bus_watch_fails_iteration() {
        let iteration = Iteration::prepare(0, &config(1, 1), None).unwrap();
        iteration.pipeline().graph().bus().remove_watch().unwrap();

        // Quota events bypass the bus, so the run itself still completes
        let report = iteration.run().await;
        assert_eq!(report.outcome, RunOutcome::Error);
        assert_eq!(report.final_state, RunState::TornDown);
        assert_eq!(report.remaining_trace, vec![1, 0]);
        assert!(matches!(
            report.failure,
            Some(StressError::RemovalFailed { ref resource, .. }) if resource == "bus watch"
        ));
    }

    #[tokio::test]
    async fn test_bus_watch_removed_after_teardown() {
        let iteration = Iteration::prepare(0, &config(1, 1), None).unwrap();
        let pipeline = iteration.pipeline().clone();
        assert!(pipeline.graph().bus().has_watch());

        iteration.run().await;
        assert!(!pipeline.graph().bus().has_watch());
        assert_eq!(pipeline.graph().state(), ElementState::Null);
    }
}
