//! Branch attacher

use contracts::BranchId;
use engine::GraphError;
use tracing::{debug, instrument};

use crate::branch::BranchDescriptor;
use crate::error::{AttachError, Result};
use crate::guard::install_guard;
use crate::pipeline::Pipeline;

/// Grow the pipeline by one branch.
///
/// The branch is built, started and guarded here, but the port is only linked
/// later, by the first data thread that runs into the guard.
///
/// # Errors
/// `FanOutMissing` when the fan-out node no longer resolves; `Graph` when the
/// new elements cannot be linked or started.
#[instrument(name = "attach_branch", skip(pipeline), fields(pipeline = pipeline.name()))]
pub fn attach_branch(pipeline: &Pipeline) -> Result<BranchId> {
    let graph = pipeline.graph();
    let fanout = graph
        .fanout(pipeline.fanout())
        .ok_or_else(|| AttachError::FanOutMissing {
            pipeline: pipeline.name().to_string(),
            element: pipeline.fanout(),
        })?;

    let branch = pipeline.build_branch()?;
    let to_graph_error = AttachError::graph(pipeline.name());
    let queue = graph
        .queue(branch.queue)
        .ok_or(GraphError::ElementNotFound(branch.queue))
        .and_then(|queue| {
            graph.sync_state_with_parent(branch.queue)?;
            graph.sync_state_with_parent(branch.sink)?;
            Ok(queue)
        })
        .map_err(to_graph_error)?;

    let port = fanout.request_port();
    let guard = install_guard(&port, queue, graph.bus().clone());

    debug!(branch = %branch.id, port = port.name(), "branch attached, waiting for guard");
    pipeline.register(BranchDescriptor {
        id: branch.id,
        queue: branch.queue,
        sink: branch.sink,
        port: port.id(),
        counter: branch.counter,
        guard: Some(guard),
    });
    Ok(branch.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_channel::{unbounded, Receiver};
    use contracts::{ElementState, LinkState, LoopEvent, ScenarioConfig, SourceSettings};
    use rand::Rng;
    use std::time::{Duration, Instant};

    use crate::Completion;

    fn config(branches: u32, quota: u64) -> ScenarioConfig {
        ScenarioConfig {
            branch_count: branches,
            quota,
            source: SourceSettings {
                unit_interval_us: 100,
                workers: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn collect_quota_events(rx: &Receiver<LoopEvent>, expected: usize, timeout: Duration) -> Vec<BranchId> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        while seen.len() < expected && Instant::now() < deadline {
            match rx.try_recv() {
                Ok(LoopEvent::QuotaReached { branch }) => seen.push(branch),
                Ok(_) => {}
                Err(_) => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        seen
    }

    #[test]
    fn test_branch_waits_for_guard() {
        let (tx, _rx) = unbounded();
        let pipeline = Pipeline::build("idle", &config(2, 3), tx).unwrap();

        // Not playing: nothing pushes, so the guard never fires
        let id = attach_branch(&pipeline).unwrap();
        let branch = pipeline.branch(id).unwrap();
        assert!(branch.is_dynamic());

        let port = pipeline
            .graph()
            .fanout(pipeline.fanout())
            .and_then(|f| f.port(branch.port))
            .unwrap();
        assert_eq!(port.link_state(), LinkState::Unlinked);
        assert_eq!(port.pending_probes(), 1);
    }

    #[test]
    fn test_attach_while_streaming() {
        let (tx, rx) = unbounded();
        let pipeline = Pipeline::build("live", &config(6, 5), tx).unwrap();
        pipeline.graph().set_state(ElementState::Playing).unwrap();

        let mut rng = rand::rng();
        for _ in 0..5 {
            std::thread::sleep(Duration::from_micros(rng.random_range(0..2000)));
            attach_branch(&pipeline).unwrap();
        }

        let mut reached = collect_quota_events(&rx, 6, Duration::from_secs(10));
        reached.sort();
        reached.dedup();
        assert_eq!(reached.len(), 6);

        let outcomes: Vec<_> = reached.iter().map(|_| pipeline.check_and_maybe_complete()).collect();
        assert_eq!(outcomes.last(), Some(&Completion::Done));
        assert_eq!(pipeline.tracker().remaining(), 0);

        pipeline.graph().set_state(ElementState::Null).unwrap();

        let snapshot = pipeline.snapshot();
        let tee = snapshot.element("tee0").unwrap();
        assert_eq!(tee.ports.len(), 6);
        for port in &tee.ports {
            assert!(port.link_calls <= 1, "port {} linked {} times", port.id, port.link_calls);
            assert!(port.delivery_ordered(), "port {} delivered before link", port.id);
            assert_eq!(port.state, LinkState::Linked);
            assert_eq!(port.pending_probes, 0);
        }
        assert!(pipeline.branches().iter().all(|b| b.reached_quota()));
    }

    #[test]
    fn test_missing_fanout() {
        let (tx, _rx) = unbounded();
        let pipeline = Pipeline::build("broken", &config(2, 1), tx).unwrap();
        pipeline.graph().remove(pipeline.fanout()).unwrap();

        let err = attach_branch(&pipeline).unwrap_err();
        assert!(matches!(err, AttachError::FanOutMissing { .. }));
        assert_eq!(pipeline.branch_count(), 1);
    }
}
