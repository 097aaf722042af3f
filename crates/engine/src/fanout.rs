//! Fan-out node
//!
//! One input, any number of request ports. Every item pushed in is offered to
//! every port in creation order; ports without a peer drop it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use contracts::{ElementId, PortId};
use tracing::debug;

use crate::clock::GraphClock;
use crate::error::{FlowError, GraphError, Result};
use crate::port::SrcPort;
use crate::queue::{Item, Queue};
use crate::sync::{read, write};

pub struct FanOut {
    id: ElementId,
    name: String,
    ports: RwLock<Vec<Arc<SrcPort>>>,
    next_port: AtomicU32,
    clock: Arc<GraphClock>,
    pushed: AtomicU64,
}

impl FanOut {
    pub(crate) fn new(id: ElementId, name: String, clock: Arc<GraphClock>) -> Self {
        Self {
            id,
            name,
            ports: RwLock::new(Vec::new()),
            next_port: AtomicU32::new(0),
            clock,
            pushed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units received on the input
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Create a new, unlinked output port
    pub fn request_port(self: &Arc<Self>) -> Arc<SrcPort> {
        let id = PortId(self.next_port.fetch_add(1, Ordering::Relaxed));
        let port = Arc::new(SrcPort::new(
            id,
            Arc::downgrade(self),
            &self.name,
            self.clock.clone(),
        ));
        write(&self.ports).push(port.clone());
        debug!(fanout = %self.name, port = %id, "request port created");
        port
    }

    pub fn port(&self, id: PortId) -> Option<Arc<SrcPort>> {
        read(&self.ports).iter().find(|p| p.id() == id).cloned()
    }

    pub fn ports(&self) -> Vec<Arc<SrcPort>> {
        read(&self.ports).clone()
    }

    pub fn port_count(&self) -> usize {
        read(&self.ports).len()
    }

    /// Link one of this node's ports to a queue
    pub fn link_port(&self, port: PortId, queue: Arc<Queue>) -> Result<()> {
        let target = self.port(port).ok_or_else(|| GraphError::PortNotFound {
            fanout: self.name.clone(),
            port,
        })?;
        target.link_to(queue)
    }

    /// Input side, called by the source's streaming threads
    pub(crate) fn chain(&self, item: Item) -> std::result::Result<(), FlowError> {
        if matches!(item, Item::Unit(_)) {
            self.pushed.fetch_add(1, Ordering::Relaxed);
        }

        // Ports requested while this item is in flight only see the next one
        let ports = self.ports();
        let mut flushing = false;
        for port in &ports {
            if let Err(FlowError::Flushing) = port.push(&item) {
                flushing = true;
            }
        }

        if flushing {
            Err(FlowError::Flushing)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("name", &self.name)
            .field("ports", &self.port_count())
            .finish()
    }
}
