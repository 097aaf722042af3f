//! Queue element
//!
//! A bounded buffer with its own streaming thread. The upstream side pushes
//! into the channel from whatever thread drives the fan-out; the queue thread
//! pops and renders into the linked sink. A full queue blocks its producer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{BusMessage, DataUnit, ElementId, ElementState};
use tracing::{debug, trace, warn};

use crate::bus::Bus;
use crate::error::{FlowError, GraphError, Result};
use crate::sink::AppSink;
use crate::sync::lock;

/// Item travelling between elements
#[derive(Debug, Clone)]
pub(crate) enum Item {
    Unit(DataUnit),
    Eos,
}

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of buffered units
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

pub struct Queue {
    id: ElementId,
    name: String,
    tx: Sender<Item>,
    rx: Receiver<Item>,
    upstream: Mutex<Option<String>>,
    downstream: Arc<Mutex<Option<Arc<AppSink>>>>,
    state: Mutex<ElementState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    bus: Bus,
    overrun_reported: AtomicBool,
    forwarded: Arc<AtomicU64>,
}

impl Queue {
    pub(crate) fn new(id: ElementId, name: String, config: &QueueConfig, bus: Bus) -> Self {
        let (tx, rx) = bounded(config.capacity.max(1));
        Self {
            id,
            name,
            tx,
            rx,
            upstream: Mutex::new(None),
            downstream: Arc::new(Mutex::new(None)),
            state: Mutex::new(ElementState::Null),
            worker: Mutex::new(None),
            bus,
            overrun_reported: AtomicBool::new(false),
            forwarded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ElementState {
        *lock(&self.state)
    }

    /// Units rendered into the sink so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Units currently buffered
    pub fn level(&self) -> usize {
        self.rx.len()
    }

    pub fn upstream_peer(&self) -> Option<String> {
        lock(&self.upstream).clone()
    }

    pub fn downstream_peer(&self) -> Option<String> {
        lock(&self.downstream)
            .as_ref()
            .map(|sink| sink.name().to_string())
    }

    /// Record the upstream peer; a queue accepts exactly one
    pub(crate) fn claim_upstream(&self, peer: &str) -> Result<()> {
        let mut upstream = lock(&self.upstream);
        if let Some(existing) = upstream.as_ref() {
            return Err(GraphError::UpstreamTaken {
                element: self.name.clone(),
                peer: existing.clone(),
            });
        }
        *upstream = Some(peer.to_string());
        Ok(())
    }

    pub(crate) fn link_sink(&self, sink: Arc<AppSink>) -> Result<()> {
        let mut downstream = lock(&self.downstream);
        if downstream.is_some() {
            return Err(GraphError::DownstreamTaken {
                element: self.name.clone(),
            });
        }
        sink.claim_upstream(&self.name)?;
        *downstream = Some(sink);
        Ok(())
    }

    /// Called from upstream streaming threads
    pub(crate) fn enqueue(&self, item: Item) -> std::result::Result<(), FlowError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(FlowError::Flushing),
            Err(TrySendError::Full(item)) => {
                if !self.overrun_reported.swap(true, Ordering::Relaxed) {
                    warn!(queue = %self.name, capacity = self.tx.capacity(), "queue full, upstream blocks");
                    self.bus.post(BusMessage::warning(
                        self.name.clone(),
                        "queue overrun, upstream is blocking",
                    ));
                }
                self.tx.send_blocking(item).map_err(|_| FlowError::Flushing)
            }
        }
    }

    pub(crate) fn set_state(&self, target: ElementState) -> Result<()> {
        let previous = std::mem::replace(&mut *lock(&self.state), target);

        match target {
            // Null is always honoured so a never-started queue still releases blocked producers
            _ if previous == target && target != ElementState::Null => Ok(()),
            ElementState::Playing => self.start(),
            ElementState::Null | ElementState::Ready => {
                self.stop();
                Ok(())
            }
            ElementState::Paused => Ok(()),
        }
    }

    fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() || self.tx.is_closed() {
            return Ok(());
        }

        let rx = self.rx.clone();
        let downstream = self.downstream.clone();
        let forwarded = self.forwarded.clone();
        let bus = self.bus.clone();
        let name = self.name.clone();

        let handle = std::thread::Builder::new()
            .name(format!("{}:src", self.name))
            .spawn(move || queue_loop(name, rx, downstream, forwarded, bus))
            .map_err(|source| GraphError::Spawn {
                element: self.name.clone(),
                source,
            })?;
        *worker = Some(handle);

        debug!(queue = %self.name, "queue streaming thread started");
        Ok(())
    }

    /// Close the channel (unblocking producers) and join the streaming thread.
    ///
    /// A stopped queue cannot be restarted.
    fn stop(&self) {
        self.tx.close();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(queue = %self.name, "queue streaming thread panicked");
            }
            debug!(queue = %self.name, "queue streaming thread stopped");
        }
    }
}

fn queue_loop(
    name: String,
    rx: Receiver<Item>,
    downstream: Arc<Mutex<Option<Arc<AppSink>>>>,
    forwarded: Arc<AtomicU64>,
    bus: Bus,
) {
    while let Ok(item) = rx.recv_blocking() {
        let sink = lock(&downstream).clone();
        let Some(sink) = sink else {
            bus.post(BusMessage::error(
                name.clone(),
                "internal data stream error: not-linked",
            ));
            break;
        };

        let is_unit = matches!(item, Item::Unit(_));
        match sink.render(item) {
            Ok(()) => {
                if is_unit {
                    forwarded.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(FlowError::Flushing) => break,
            Err(e) => {
                bus.post(BusMessage::error(
                    name.clone(),
                    format!("internal data stream error: {e}"),
                ));
                break;
            }
        }
    }
    trace!(queue = %name, "queue loop finished");
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("level", &self.level())
            .finish()
    }
}
