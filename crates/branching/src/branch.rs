//! Branch descriptor

use std::sync::Arc;

use contracts::{BranchId, ElementId, PortId};
use engine::ProbeId;

use crate::counter::BufferCounter;

/// One consumer branch: queue + sink hanging off a fan-out port
#[derive(Debug, Clone)]
pub struct BranchDescriptor {
    pub id: BranchId,
    pub queue: ElementId,
    pub sink: ElementId,
    /// Port reserved on the fan-out node for this branch
    pub port: PortId,
    pub counter: Arc<BufferCounter>,
    /// Guard installed on the port; `None` for the statically linked branch
    pub guard: Option<ProbeId>,
}

impl BranchDescriptor {
    pub fn consumed(&self) -> u64 {
        self.counter.count()
    }

    pub fn reached_quota(&self) -> bool {
        self.counter.reached()
    }

    pub fn is_dynamic(&self) -> bool {
        self.guard.is_some()
    }
}
