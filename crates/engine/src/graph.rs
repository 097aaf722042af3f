//! Graph container
//!
//! Owns every element, hands out typed handles, propagates state changes and
//! aggregates end-of-stream. `Graph` is a cheap handle; clones share the same
//! container.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use contracts::{
    BusMessage, ElementId, ElementKind, ElementSnapshot, ElementState, GraphSnapshot,
    LinkSnapshot, PortId,
};
use tracing::{debug, info, instrument};

use crate::bus::Bus;
use crate::clock::GraphClock;
use crate::error::{GraphError, Result};
use crate::fanout::FanOut;
use crate::queue::{Queue, QueueConfig};
use crate::sink::{AppSink, SinkConfig};
use crate::source::{Source, SourceConfig};
use crate::sync::lock;

/// Any element the container can hold
#[derive(Clone, Debug)]
pub enum Element {
    Source(Arc<Source>),
    FanOut(Arc<FanOut>),
    Queue(Arc<Queue>),
    Sink(Arc<AppSink>),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Source(_) => ElementKind::Source,
            Self::FanOut(_) => ElementKind::FanOut,
            Self::Queue(_) => ElementKind::Queue,
            Self::Sink(_) => ElementKind::Sink,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Source(e) => e.name(),
            Self::FanOut(e) => e.name(),
            Self::Queue(e) => e.name(),
            Self::Sink(e) => e.name(),
        }
    }

    fn set_state(&self, state: ElementState) -> Result<()> {
        match self {
            Self::Source(e) => e.set_state(state),
            Self::FanOut(_) => Ok(()),
            Self::Queue(e) => e.set_state(state),
            Self::Sink(e) => {
                e.set_state(state);
                Ok(())
            }
        }
    }
}

struct GraphShared {
    name: String,
    state: Mutex<ElementState>,
    elements: Mutex<BTreeMap<ElementId, Element>>,
    next_id: AtomicUsize,
    name_counters: Mutex<HashMap<ElementKind, u32>>,
    bus: Bus,
    clock: Arc<GraphClock>,
    eos_posted: AtomicBool,
}

/// Element graph (the pipeline's structural container)
#[derive(Clone)]
pub struct Graph {
    shared: Arc<GraphShared>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(GraphShared {
                name: name.into(),
                state: Mutex::new(ElementState::Null),
                elements: Mutex::new(BTreeMap::new()),
                next_id: AtomicUsize::new(0),
                name_counters: Mutex::new(HashMap::new()),
                bus: Bus::new(),
                clock: Arc::new(GraphClock::new()),
                eos_posted: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn bus(&self) -> &Bus {
        &self.shared.bus
    }

    pub fn state(&self) -> ElementState {
        *lock(&self.shared.state)
    }

    // ===== Element creation =====

    pub fn add_source(&self, config: SourceConfig) -> ElementId {
        let (id, name) = self.allocate(ElementKind::Source, "source");
        let source = Source::new(id, name, config, self.shared.bus.clone());
        self.insert(id, Element::Source(Arc::new(source)))
    }

    pub fn add_fanout(&self) -> ElementId {
        let (id, name) = self.allocate(ElementKind::FanOut, "tee");
        let fanout = FanOut::new(id, name, self.shared.clock.clone());
        self.insert(id, Element::FanOut(Arc::new(fanout)))
    }

    pub fn add_queue(&self, config: &QueueConfig) -> ElementId {
        let (id, name) = self.allocate(ElementKind::Queue, "queue");
        let queue = Queue::new(id, name, config, self.shared.bus.clone());
        self.insert(id, Element::Queue(Arc::new(queue)))
    }

    pub fn add_sink(&self, config: SinkConfig) -> ElementId {
        let (id, name) = self.allocate(ElementKind::Sink, "appsink");
        let weak = self.downgrade();
        let on_eos = Arc::new(move || {
            if let Some(graph) = weak.upgrade() {
                graph.check_eos();
            }
        });
        let sink = AppSink::new(id, name, config, self.shared.clock.clone(), on_eos);
        self.insert(id, Element::Sink(Arc::new(sink)))
    }

    fn allocate(&self, kind: ElementKind, prefix: &str) -> (ElementId, String) {
        let id = ElementId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let mut counters = lock(&self.shared.name_counters);
        let n = counters.entry(kind).or_insert(0);
        let name = format!("{prefix}{n}");
        *n += 1;
        (id, name)
    }

    fn insert(&self, id: ElementId, element: Element) -> ElementId {
        debug!(graph = %self.shared.name, element = element.name(), %id, "element added");
        lock(&self.shared.elements).insert(id, element);
        id
    }

    // ===== Lookup =====

    pub fn element(&self, id: ElementId) -> Option<Element> {
        lock(&self.shared.elements).get(&id).cloned()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        lock(&self.shared.elements).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.elements).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self, id: ElementId) -> Option<Arc<Source>> {
        match self.element(id)? {
            Element::Source(e) => Some(e),
            _ => None,
        }
    }

    pub fn fanout(&self, id: ElementId) -> Option<Arc<FanOut>> {
        match self.element(id)? {
            Element::FanOut(e) => Some(e),
            _ => None,
        }
    }

    pub fn queue(&self, id: ElementId) -> Option<Arc<Queue>> {
        match self.element(id)? {
            Element::Queue(e) => Some(e),
            _ => None,
        }
    }

    pub fn sink(&self, id: ElementId) -> Option<Arc<AppSink>> {
        match self.element(id)? {
            Element::Sink(e) => Some(e),
            _ => None,
        }
    }

    fn require(&self, id: ElementId) -> Result<Element> {
        self.element(id).ok_or(GraphError::ElementNotFound(id))
    }

    /// Remove an element from the container and stop it.
    ///
    /// Elements still referenced by peers (a fan-out held by its source, a
    /// queue held by a port) stay alive until those references go away.
    #[instrument(name = "graph_remove", skip(self), fields(graph = %self.shared.name))]
    pub fn remove(&self, id: ElementId) -> Result<Element> {
        let element = lock(&self.shared.elements)
            .remove(&id)
            .ok_or(GraphError::ElementNotFound(id))?;
        element.set_state(ElementState::Null)?;
        if let Element::Source(source) = &element {
            source.join();
        }
        debug!(element = element.name(), "element removed");
        Ok(element)
    }

    // ===== Linking =====

    /// Link two elements.
    ///
    /// Supported directions: source -> fan-out, fan-out -> queue (through a
    /// fresh request port), queue -> sink.
    pub fn link(&self, upstream: ElementId, downstream: ElementId) -> Result<()> {
        let up = self.require(upstream)?;
        let down = self.require(downstream)?;

        match (&up, &down) {
            (Element::Source(source), Element::FanOut(fanout)) => source.link(fanout.clone()),
            (Element::FanOut(_), Element::Queue(_)) => {
                self.link_fanout(upstream, downstream).map(|_| ())
            }
            (Element::Queue(queue), Element::Sink(sink)) => queue.link_sink(sink.clone()),
            _ => Err(GraphError::IncompatibleLink {
                from: up.kind(),
                to: down.kind(),
            }),
        }?;

        debug!(from = up.name(), to = down.name(), "elements linked");
        Ok(())
    }

    /// Link a queue to a new request port of a fan-out node, returning the port
    pub fn link_fanout(&self, fanout: ElementId, queue: ElementId) -> Result<PortId> {
        let node = self.fanout(fanout).ok_or_else(|| self.kind_error(fanout, ElementKind::FanOut))?;
        let target = self.queue(queue).ok_or_else(|| self.kind_error(queue, ElementKind::Queue))?;

        let port = node.request_port();
        node.link_port(port.id(), target)?;
        Ok(port.id())
    }

    fn kind_error(&self, id: ElementId, expected: ElementKind) -> GraphError {
        match self.element(id) {
            Some(element) => GraphError::WrongKind {
                id,
                expected,
                actual: element.kind(),
            },
            None => GraphError::ElementNotFound(id),
        }
    }

    // ===== State =====

    /// Change the graph state and propagate it to every element.
    ///
    /// Going to Playing starts sinks and queues before sources. Going down
    /// stops sources first, closes queues (unblocking any producer stuck on a
    /// full one), then joins the producers.
    #[instrument(name = "graph_set_state", skip(self), fields(graph = %self.shared.name))]
    pub fn set_state(&self, target: ElementState) -> Result<ElementState> {
        let old = std::mem::replace(&mut *lock(&self.shared.state), target);
        let elements: Vec<Element> = lock(&self.shared.elements).values().cloned().collect();

        if target.is_streaming() {
            self.shared.clock.base_time();
            for kind in [ElementKind::Sink, ElementKind::Queue, ElementKind::FanOut, ElementKind::Source] {
                for element in elements.iter().filter(|e| e.kind() == kind) {
                    element.set_state(target)?;
                }
            }
        } else {
            for element in &elements {
                if let Element::Source(source) = element {
                    source.set_state(target)?;
                }
            }
            for element in &elements {
                if !matches!(element, Element::Source(_)) {
                    element.set_state(target)?;
                }
            }
            for element in &elements {
                if let Element::Source(source) = element {
                    source.join();
                }
            }
        }

        if old != target {
            info!(%old, new = %target, "graph state changed");
            self.shared.bus.post(BusMessage::StateChanged {
                source: self.shared.name.clone(),
                old,
                new: target,
            });
        }
        Ok(old)
    }

    /// Bring an element added at runtime to the graph's current state
    pub fn sync_state_with_parent(&self, id: ElementId) -> Result<()> {
        let element = self.require(id)?;
        element.set_state(self.state())
    }

    // ===== End-of-stream =====

    fn check_eos(&self) {
        let all_eos = {
            let elements = lock(&self.shared.elements);
            let mut sinks = elements.values().filter_map(|e| match e {
                Element::Sink(sink) => Some(sink),
                _ => None,
            });
            sinks.all(|sink| sink.is_eos())
        };

        if all_eos && !self.shared.eos_posted.swap(true, Ordering::SeqCst) {
            debug!(graph = %self.shared.name, "all sinks reached eos");
            self.shared.bus.post(BusMessage::eos(self.shared.name.clone()));
        }
    }

    // ===== Diagnostics =====

    /// Capture the current structure for diagnostics
    pub fn snapshot(&self) -> GraphSnapshot {
        let elements: Vec<Element> = lock(&self.shared.elements).values().cloned().collect();
        let mut snapshots = Vec::with_capacity(elements.len());
        let mut links = Vec::new();

        for element in &elements {
            let name = element.name().to_string();
            let (state, units, ports) = match element {
                Element::Source(source) => {
                    if let Some(peer) = source.peer_name() {
                        links.push(LinkSnapshot { from: name.clone(), to: peer });
                    }
                    (source.state(), source.produced(), Vec::new())
                }
                Element::FanOut(fanout) => {
                    let ports: Vec<_> = fanout.ports().iter().map(|p| p.snapshot()).collect();
                    for port in &ports {
                        if let Some(peer) = &port.peer {
                            links.push(LinkSnapshot { from: name.clone(), to: peer.clone() });
                        }
                    }
                    (self.state(), fanout.pushed(), ports)
                }
                Element::Queue(queue) => {
                    if let Some(peer) = queue.downstream_peer() {
                        links.push(LinkSnapshot { from: name.clone(), to: peer });
                    }
                    (queue.state(), queue.forwarded(), Vec::new())
                }
                Element::Sink(sink) => (sink.state(), sink.consumed(), Vec::new()),
            };

            snapshots.push(ElementSnapshot {
                id: match element {
                    Element::Source(e) => e.id(),
                    Element::FanOut(e) => e.id(),
                    Element::Queue(e) => e.id(),
                    Element::Sink(e) => e.id(),
                },
                name,
                kind: element.kind(),
                state,
                units,
                ports,
            });
        }

        GraphSnapshot {
            name: self.shared.name.clone(),
            state: self.state(),
            elements: snapshots,
            links,
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("elements", &self.len())
            .finish()
    }
}

/// Non-owning graph handle, used by callbacks that must not keep a torn-down
/// graph alive
#[derive(Clone)]
pub struct WeakGraph {
    shared: Weak<GraphShared>,
}

impl WeakGraph {
    pub fn upgrade(&self) -> Option<Graph> {
        self.shared.upgrade().map(|shared| Graph { shared })
    }
}

impl Graph {
    pub fn downgrade(&self) -> WeakGraph {
        WeakGraph {
            shared: Arc::downgrade(&self.shared),
        }
    }
}
