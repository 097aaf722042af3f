//! Fan-out request ports and blocking probes
//!
//! A port carries three pieces of state, each behind its own lock so that
//! different ports never contend:
//! - the link (`LinkState` + peer queue), the port's exclusion lock
//! - the probe list
//! - instrumentation counters (atomics only)
//!
//! Every push first runs the installed probes on the pushing thread. Data only
//! moves on once they have returned, and only if the port has a peer.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use contracts::{LinkState, PortId, PortSnapshot};
use tracing::{debug, trace};

use crate::clock::GraphClock;
use crate::error::{FlowError, GraphError, Result};
use crate::fanout::FanOut;
use crate::queue::{Item, Queue};
use crate::sync::lock;

/// What a probe wants done with itself after running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReturn {
    /// Keep the probe installed, let the data through
    Pass,
    /// Uninstall the probe, let the data through
    Remove,
}

/// Handle returned by [`SrcPort::add_probe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(u64);

/// Blocking probe callback. Runs on the data thread that attempts the push.
pub type Probe = Arc<dyn Fn(&SrcPort) -> ProbeReturn + Send + Sync>;

struct PortLink {
    state: LinkState,
    peer: Option<Arc<Queue>>,
}

#[derive(Default)]
struct PortStats {
    link_calls: AtomicU32,
    linked_at: AtomicU64,
    first_delivery_at: AtomicU64,
    deliveries: AtomicU64,
}

/// Output port of a fan-out node
pub struct SrcPort {
    id: PortId,
    name: String,
    owner: Weak<FanOut>,
    link: Mutex<PortLink>,
    probes: Mutex<Vec<(ProbeId, Probe)>>,
    next_probe: AtomicU64,
    clock: Arc<GraphClock>,
    stats: PortStats,
}

impl SrcPort {
    pub(crate) fn new(id: PortId, owner: Weak<FanOut>, owner_name: &str, clock: Arc<GraphClock>) -> Self {
        Self {
            id,
            name: format!("{owner_name}:{id}"),
            owner,
            link: Mutex::new(PortLink {
                state: LinkState::Unlinked,
                peer: None,
            }),
            probes: Mutex::new(Vec::new()),
            next_probe: AtomicU64::new(0),
            clock,
            stats: PortStats::default(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    /// `<fanout name>:src_<n>`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link_state(&self) -> LinkState {
        lock(&self.link).state
    }

    pub fn is_linked(&self) -> bool {
        self.link_state() == LinkState::Linked
    }

    /// Claim the port for linking.
    ///
    /// Test-and-set under the port lock: returns `true` for exactly one caller
    /// and moves the port from `Unlinked` to `Linking`. Everyone else, and
    /// every caller once the port is linked, gets `false`.
    pub fn begin_linking(&self) -> bool {
        let mut link = lock(&self.link);
        if link.state != LinkState::Unlinked {
            return false;
        }
        link.state = LinkState::Linking;
        true
    }

    /// Give up a claim taken through [`begin_linking`](Self::begin_linking).
    ///
    /// Returns the port to `Unlinked` unless a link went through in the
    /// meantime, so a later attempt can claim it again.
    pub fn abort_linking(&self) {
        let mut link = lock(&self.link);
        if link.state == LinkState::Linking && link.peer.is_none() {
            link.state = LinkState::Unlinked;
            trace!(port = %self.name, "link claim released");
        }
    }

    /// Resolve the owning fan-out node; `None` once it has been torn down
    pub fn parent(&self) -> Option<Arc<FanOut>> {
        self.owner.upgrade()
    }

    /// Name of the linked peer, if any
    pub fn peer_name(&self) -> Option<String> {
        lock(&self.link).peer.as_ref().map(|q| q.name().to_string())
    }

    /// Install a blocking probe
    pub fn add_probe<F>(&self, probe: F) -> ProbeId
    where
        F: Fn(&SrcPort) -> ProbeReturn + Send + Sync + 'static,
    {
        let id = ProbeId(self.next_probe.fetch_add(1, Ordering::Relaxed));
        lock(&self.probes).push((id, Arc::new(probe)));
        id
    }

    /// Uninstall a probe. Returns `false` if it was already gone.
    pub fn remove_probe(&self, id: ProbeId) -> bool {
        let mut probes = lock(&self.probes);
        let before = probes.len();
        probes.retain(|(probe_id, _)| *probe_id != id);
        probes.len() != before
    }

    pub fn pending_probes(&self) -> usize {
        lock(&self.probes).len()
    }

    /// Structural link to a queue.
    ///
    /// Accepts a port that is `Unlinked` (static linking) or `Linking`
    /// (claimed through [`begin_linking`](Self::begin_linking)).
    pub(crate) fn link_to(&self, queue: Arc<Queue>) -> Result<()> {
        self.stats.link_calls.fetch_add(1, Ordering::SeqCst);

        let mut link = lock(&self.link);
        if link.peer.is_some() {
            return Err(GraphError::PortAlreadyLinked {
                port: self.name.clone(),
            });
        }
        queue.claim_upstream(&self.name)?;

        // Stamp before publishing the peer: any delivery observes the peer
        // afterwards and therefore ticks a later value.
        self.stats
            .linked_at
            .store(self.clock.tick(), Ordering::SeqCst);
        link.peer = Some(queue);
        link.state = LinkState::Linked;

        debug!(port = %self.name, "port linked");
        Ok(())
    }

    /// Push one item through the port. Returns whether it reached a peer.
    pub(crate) fn push(&self, item: &Item) -> std::result::Result<bool, FlowError> {
        self.run_probes();

        let peer = lock(&self.link).peer.clone();
        let Some(queue) = peer else {
            trace!(port = %self.name, "not linked, item dropped");
            return Ok(false);
        };

        if matches!(item, Item::Unit(_)) {
            self.record_delivery();
        }
        queue.enqueue(item.clone())?;
        Ok(true)
    }

    fn run_probes(&self) {
        let probes: Vec<(ProbeId, Probe)> = lock(&self.probes).clone();
        for (id, probe) in probes {
            if probe(self) == ProbeReturn::Remove && self.remove_probe(id) {
                trace!(port = %self.name, "probe removed");
            }
        }
    }

    fn record_delivery(&self) {
        let now = self.clock.tick();
        let _ = self.stats.first_delivery_at.compare_exchange(
            0,
            now,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn link_calls(&self) -> u32 {
        self.stats.link_calls.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> u64 {
        self.stats.deliveries.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PortSnapshot {
        let (state, peer) = {
            let link = lock(&self.link);
            (link.state, link.peer.as_ref().map(|q| q.name().to_string()))
        };
        let nonzero = |v: u64| (v != 0).then_some(v);

        PortSnapshot {
            id: self.id,
            state,
            peer,
            link_calls: self.link_calls(),
            linked_at: nonzero(self.stats.linked_at.load(Ordering::SeqCst)),
            first_delivery_at: nonzero(self.stats.first_delivery_at.load(Ordering::SeqCst)),
            deliveries: self.deliveries(),
            pending_probes: self.pending_probes(),
        }
    }
}

impl std::fmt::Debug for SrcPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrcPort")
            .field("name", &self.name)
            .field("state", &self.link_state())
            .finish()
    }
}
