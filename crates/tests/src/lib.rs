//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 场景测试 A-D（单分支、多分支、fan-out 丢失、超时）
//! - 分支挂载顺序与单次链接的端到端校验
//! - 配置文件 -> Runner 全链路

#[cfg(test)]
mod common {
    use contracts::{ScenarioConfig, SourceSettings};

    /// Fast scenario: attachments fire at once, source paced at 5 kHz
    pub fn scenario(branches: u32, quota: u64) -> ScenarioConfig {
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
}

#[cfg(test)]
mod scenario_tests {
    use std::time::{Duration, Instant};

    use contracts::{RunOutcome, RunState, StressError};
    use runner::Iteration;

    use crate::common::scenario;

    /// Scenario A: B=1, Q=1
    #[tokio::test]
    async fn test_single_branch_single_unit() {
        let report = Iteration::prepare(0, &scenario(1, 1), None).unwrap().run().await;

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.final_state, RunState::TornDown);
        // one decrement, straight to zero
        assert_eq!(report.remaining_trace, vec![1, 0]);
    }

    /// Scenario B: B=5, Q=3, interval 0
    #[tokio::test]
    async fn test_five_branches_count_down() {
        let iteration = Iteration::prepare(0, &scenario(5, 3), None).unwrap();
        let pipeline = iteration.pipeline().clone();
        let report = iteration.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed, "{:?}", report.failure);
        assert_eq!(report.remaining_trace, vec![5, 4, 3, 2, 1, 0]);
        assert_eq!(report.branches_attached, 5);

        let branches = pipeline.branches();
        assert_eq!(branches.iter().filter(|b| b.is_dynamic()).count(), 4);
        assert!(branches.iter().all(|b| b.reached_quota()));
        assert!(pipeline.tracker().is_complete());
    }

    /// Scenario C: fan-out removed before the attachments fire
    #[tokio::test]
    async fn test_missing_fanout_is_structural_error() {
        let config = scenario(4, u64::MAX);
        let iteration = Iteration::prepare(3, &config, None).unwrap();
        let pipeline = iteration.pipeline().clone();
        pipeline.graph().remove(pipeline.fanout()).unwrap();

        let started = Instant::now();
        let report = iteration.run().await;

        assert_eq!(report.outcome, RunOutcome::Error);
        assert_eq!(report.final_state, RunState::TornDown);
        assert!(matches!(
            report.failure,
            Some(StressError::FanOutMissing { ref pipeline, .. }) if pipeline == "tee_test_3"
        ));
        // stopped on the first failed attachment, no retry
        assert_eq!(report.branches_attached, 1);
        assert!(report.elapsed < Duration::from_millis(100), "{:?}", report.elapsed);
        assert!(started.elapsed() < config.watchdog_timeout());
    }

    /// Scenario D: no branch can reach its quota
    #[tokio::test]
    async fn test_timeout_not_before_deadline() {
        let mut config = scenario(3, u64::MAX);
        config.watchdog_timeout_ms = 300;

        let report = Iteration::prepare(0, &config, None).unwrap().run().await;

        assert_eq!(report.outcome, RunOutcome::Timeout);
        assert!(report.elapsed >= Duration::from_millis(300));
        match report.failure {
            Some(StressError::Timeout { waited_ms, remaining, .. }) => {
                assert!(waited_ms >= 300);
                assert_eq!(remaining, 3);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(report.remaining_trace, vec![3]);
    }
}

#[cfg(test)]
mod bus_tests {
    use std::time::Duration;

    use contracts::{BusMessage, RunOutcome, RunState, StressError};
    use observability::SnapshotDumper;
    use runner::Iteration;

    use crate::common::scenario;

    fn dumps_of(dir: &std::path::Path, kind: &str) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.contains(&format!("-{kind}-")))
            .collect()
    }

    /// An element error posted mid-run fails the iteration
    #[tokio::test]
    async fn test_engine_error_fails_running_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = SnapshotDumper::new(dir.path());
        let iteration = Iteration::prepare(4, &scenario(2, u64::MAX), Some(dumper)).unwrap();
        let bus = iteration.pipeline().graph().bus().clone();

        let poster = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            bus.post(BusMessage::error("videotestsrc0", "internal data stream error"))
        });
        let report = iteration.run().await;
        assert!(poster.await.unwrap());

        assert_eq!(report.outcome, RunOutcome::Error);
        assert_eq!(report.final_state, RunState::TornDown);
        assert!(report.elapsed < Duration::from_secs(10));
        match report.failure {
            Some(StressError::Engine { ref origin, ref message }) => {
                assert_eq!(origin, "videotestsrc0");
                assert_eq!(message, "internal data stream error");
            }
            other => panic!("expected engine error, got {other:?}"),
        }
        assert_eq!(dumps_of(dir.path(), "error").len(), 2);
    }

    /// A warning is dumped and logged but the iteration carries on
    #[tokio::test]
    async fn test_engine_warning_dumps_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = SnapshotDumper::new(dir.path());
        let iteration = Iteration::prepare(5, &scenario(2, u64::MAX), Some(dumper)).unwrap();
        let bus = iteration.pipeline().graph().bus().clone();

        let poster = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus.post(BusMessage::warning("queue1", "buffer late"));
            tokio::time::sleep(Duration::from_millis(30)).await;
            bus.post(BusMessage::Eos {
                source: "appsink0".into(),
            });
        });
        let report = iteration.run().await;
        poster.await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed, "{:?}", report.failure);
        assert!(report.failure.is_none());
        // still running after the warning
        assert!(report.elapsed >= Duration::from_millis(40));

        let dumped = dumps_of(dir.path(), "warning");
        assert_eq!(dumped.len(), 2);
        assert!(dumped.iter().all(|name| name.ends_with("tee_test_5.dot") || name.ends_with("tee_test_5.json")));
        assert!(dumps_of(dir.path(), "error").is_empty());
    }
}

#[cfg(test)]
mod attachment_tests {
    use contracts::{ElementKind, LinkState, RunOutcome};
    use runner::Iteration;

    use crate::common::scenario;

    /// Many branches attached while four threads push into the tee
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dynamic_ports_link_once_before_delivery() {
        let mut config = scenario(32, 5);
        config.source.workers = 4;
        config.source.unit_interval_us = 50;

        let iteration = Iteration::prepare(0, &config, None).unwrap();
        let pipeline = iteration.pipeline().clone();
        let report = iteration.run().await;
        assert_eq!(report.outcome, RunOutcome::Completed, "{:?}", report.failure);

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.count(ElementKind::Queue), 32);
        assert_eq!(snapshot.count(ElementKind::Sink), 32);

        let tee = snapshot
            .elements
            .iter()
            .find(|e| e.kind == ElementKind::FanOut)
            .expect("tee in snapshot");
        assert_eq!(tee.ports.len(), 32);
        for port in &tee.ports {
            assert!(port.link_calls <= 1, "{} linked {} times", port.id, port.link_calls);
            assert_eq!(port.state, LinkState::Linked);
            assert_eq!(port.pending_probes, 0);
            assert!(port.delivery_ordered(), "{} delivered before link", port.id);
        }
    }

    #[tokio::test]
    async fn test_staggered_schedule_completes() {
        let mut config = scenario(4, 2);
        config.attach_mode = contracts::AttachMode::Staggered;
        config.attach_interval_ms = 20;

        let report = Iteration::prepare(0, &config, None).unwrap().run().await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.remaining_trace.last(), Some(&0));
    }
}

#[cfg(test)]
mod run_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::RunOutcome;
    use runner::Runner;

    /// Scenario file -> loader -> repeat loop
    #[tokio::test]
    async fn test_run_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(
            &path,
            r#"
iterations = 5
branch_count = 4
quota = 2
attach_interval_ms = 0
watchdog_timeout_ms = 10000

[source]
unit_interval_us = 200
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        let summary = Runner::new(config).run().await;

        assert!(summary.is_success());
        assert_eq!(summary.executed, 5);
        assert_eq!(summary.stats.summary().completed, 5);
    }

    /// A timed-out iteration aborts the run and leaves its snapshot behind
    #[tokio::test]
    async fn test_failure_aborts_and_dumps() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            r#"{{
                "iterations": 10,
                "branch_count": 2,
                "quota": 1000000,
                "attach_interval_ms": 0,
                "watchdog_timeout_ms": 200,
                "diagnostics_dir": {:?}
            }}"#,
            dir.path().display().to_string()
        );
        let config = ConfigLoader::load_from_str(&content, ConfigFormat::Json).unwrap();

        let summary = Runner::new(config).run().await;
        assert!(!summary.is_success());
        assert_eq!(summary.executed, 1);

        let failed = summary.failed.expect("failed iteration");
        assert_eq!(failed.outcome, RunOutcome::Timeout);

        let dumps = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(dumps, 2);
    }
}
