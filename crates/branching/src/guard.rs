//! Blocking guard
//!
//! Installed on a freshly requested fan-out port. The first data thread that
//! tries to push through the port runs the guard, which links the port to the
//! branch's queue and then uninstalls itself. Data only crosses the port once
//! the link is in place.

use std::sync::{Arc, Mutex, PoisonError};

use contracts::BusMessage;
use engine::{Bus, ProbeId, ProbeReturn, Queue, SrcPort};
use tracing::{debug, warn};

/// Guard state for one port
pub struct BlockingGuard {
    /// Branch entry element, released once the guard has fired
    target: Mutex<Option<Arc<Queue>>>,
    bus: Bus,
}

impl BlockingGuard {
    pub fn new(target: Arc<Queue>, bus: Bus) -> Self {
        Self {
            target: Mutex::new(Some(target)),
            bus,
        }
    }

    /// Whether the guard still holds its target
    pub fn is_armed(&self) -> bool {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Probe body. Safe to enter from several data threads at once.
    pub fn on_probe(&self, port: &SrcPort) -> ProbeReturn {
        if port.is_linked() {
            return ProbeReturn::Pass;
        }

        // Only one caller gets past this point
        if !port.begin_linking() {
            return ProbeReturn::Pass;
        }

        let Some(fanout) = port.parent() else {
            debug!(port = port.name(), "fan-out node gone, guard passes");
            port.abort_linking();
            return ProbeReturn::Pass;
        };

        let target = self
            .target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(queue) = target else {
            port.abort_linking();
            return ProbeReturn::Remove;
        };

        let queue_name = queue.name().to_string();
        match fanout.link_port(port.id(), queue) {
            Ok(()) => debug!(port = port.name(), queue = %queue_name, "branch linked under guard"),
            Err(e) => {
                port.abort_linking();
                warn!(port = port.name(), queue = %queue_name, error = %e, "guarded link failed");
                self.bus.post(BusMessage::error(
                    port.name(),
                    format!("failed to link to '{queue_name}': {e}"),
                ));
            }
        }

        ProbeReturn::Remove
    }
}

/// Install a blocking guard on `port` targeting `queue`
pub fn install_guard(port: &SrcPort, queue: Arc<Queue>, bus: Bus) -> ProbeId {
    let guard = BlockingGuard::new(queue, bus);
    port.add_probe(move |port| guard.on_probe(port))
}
