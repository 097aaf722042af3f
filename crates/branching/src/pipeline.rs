//! Pipeline
//!
//! One per test iteration: source -> tee0 -> (queue -> appsink) x N, plus the
//! completion tracker and the sender side of the run loop's event channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_channel::Sender;
use contracts::{BranchId, ElementId, ElementState, GraphSnapshot, LoopEvent, ScenarioConfig};
use engine::{Graph, QueueConfig, SinkConfig, SourceConfig, UnitCallback};
use tracing::{debug, info, trace};

use crate::branch::BranchDescriptor;
use crate::counter::BufferCounter;
use crate::error::{AttachError, Result};
use crate::tracker::{Completion, CompletionTracker};

/// Elements of a branch that has been built but not attached yet
pub(crate) struct PendingBranch {
    pub id: BranchId,
    pub queue: ElementId,
    pub sink: ElementId,
    pub counter: Arc<BufferCounter>,
}

pub struct Pipeline {
    name: String,
    graph: Graph,
    fanout: ElementId,
    tracker: Arc<CompletionTracker>,
    branches: Mutex<Vec<BranchDescriptor>>,
    next_branch: AtomicU32,
    quota: u64,
    queue_config: QueueConfig,
    events: Sender<LoopEvent>,
}

impl Pipeline {
    /// Build the static part of the graph: source, fan-out node and the
    /// initial branch, linked directly.
    ///
    /// The tracker is sized for `config.branch_count` branches, the initial one
    /// included.
    pub fn build(
        name: impl Into<String>,
        config: &ScenarioConfig,
        events: Sender<LoopEvent>,
    ) -> Result<Self> {
        let name = name.into();
        let graph = Graph::new(name.clone());
        let source = graph.add_source(SourceConfig::from(&config.source));
        let fanout = graph.add_fanout();
        graph
            .link(source, fanout)
            .map_err(AttachError::graph(&name))?;

        let pipeline = Self {
            tracker: Arc::new(CompletionTracker::new(u64::from(config.branch_count))),
            branches: Mutex::new(Vec::with_capacity(config.branch_count as usize)),
            next_branch: AtomicU32::new(0),
            quota: config.quota,
            queue_config: QueueConfig {
                capacity: config.queue_capacity,
            },
            name,
            graph,
            fanout,
            events,
        };

        let branch = pipeline.build_branch()?;
        let port = pipeline
            .graph
            .link_fanout(fanout, branch.queue)
            .map_err(AttachError::graph(&pipeline.name))?;
        pipeline.register(BranchDescriptor {
            id: branch.id,
            queue: branch.queue,
            sink: branch.sink,
            port,
            counter: branch.counter,
            guard: None,
        });

        info!(
            pipeline = %pipeline.name,
            branches = config.branch_count,
            quota = config.quota,
            "pipeline built"
        );
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Handle of the fan-out node
    pub fn fanout(&self) -> ElementId {
        self.fanout
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Completion check for one branch that reached its quota
    pub fn check_and_maybe_complete(&self) -> Completion {
        let completion = self.tracker.check_and_maybe_complete();
        debug!(pipeline = %self.name, ?completion, "completion check");
        completion
    }

    pub fn branches(&self) -> Vec<BranchDescriptor> {
        self.lock_branches().clone()
    }

    pub fn branch(&self, id: BranchId) -> Option<BranchDescriptor> {
        self.lock_branches().iter().find(|b| b.id == id).cloned()
    }

    pub fn branch_count(&self) -> usize {
        self.lock_branches().len()
    }

    /// Units consumed over all branches
    pub fn units_consumed(&self) -> u64 {
        self.lock_branches().iter().map(|b| b.consumed()).sum()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// Add a queue and an unpaced sink wired to this pipeline's counters
    pub(crate) fn build_branch(&self) -> Result<PendingBranch> {
        let id = BranchId(self.next_branch.fetch_add(1, Ordering::Relaxed));
        let counter = Arc::new(BufferCounter::new(self.quota));

        let queue = self.graph.add_queue(&self.queue_config);
        let sink = self.graph.add_sink(SinkConfig::unpaced());
        if let Some(handle) = self.graph.sink(sink) {
            handle.set_callback(self.unit_callback(id, counter.clone()));
        }
        self.graph
            .link(queue, sink)
            .map_err(AttachError::graph(&self.name))?;

        Ok(PendingBranch {
            id,
            queue,
            sink,
            counter,
        })
    }

    pub(crate) fn register(&self, branch: BranchDescriptor) {
        self.lock_branches().push(branch);
    }

    fn unit_callback(&self, branch: BranchId, counter: Arc<BufferCounter>) -> UnitCallback {
        let events = self.events.clone();
        Arc::new(move |_unit| {
            if counter.on_unit_consumed() {
                trace!(%branch, "quota reached");
                // Unbounded channel: only fails once the loop is gone
                let _ = events.try_send(LoopEvent::QuotaReached { branch });
            }
            Ok(())
        })
    }

    fn lock_branches(&self) -> std::sync::MutexGuard<'_, Vec<BranchDescriptor>> {
        self.branches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Stop streaming threads even if the controller bailed out early
        if self.graph.state() != ElementState::Null {
            let _ = self.graph.set_state(ElementState::Null);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("branches", &self.branch_count())
            .field("remaining", &self.tracker.remaining())
            .finish()
    }
}
