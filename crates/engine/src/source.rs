//! Source element
//!
//! Produces sequence-numbered units on one or more streaming threads and
//! pushes them into the linked fan-out node. With more than one worker the
//! fan-out, its ports and their probes are driven from several threads at
//! once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use contracts::{BusMessage, DataUnit, ElementId, ElementState, SourceSettings};
use tracing::{debug, trace, warn};

use crate::bus::Bus;
use crate::error::{FlowError, GraphError, Result};
use crate::fanout::FanOut;
use crate::queue::Item;
use crate::sync::lock;

/// Source configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Pause between two units of the same worker (zero = push as fast as possible)
    pub unit_interval: Duration,

    /// Payload size in bytes
    pub unit_size: usize,

    /// Total units before end-of-stream (None = unlimited)
    pub num_units: Option<u64>,

    /// Streaming threads
    pub workers: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            unit_interval: Duration::from_millis(1),
            unit_size: 1024,
            num_units: None,
            workers: 1,
        }
    }
}

impl From<&SourceSettings> for SourceConfig {
    fn from(settings: &SourceSettings) -> Self {
        Self {
            unit_interval: settings.unit_interval(),
            unit_size: settings.unit_size,
            num_units: settings.num_units,
            workers: settings.workers,
        }
    }
}

/// State shared between the element and its workers
struct Shared {
    name: String,
    config: SourceConfig,
    payload: Bytes,
    running: AtomicBool,
    next_seq: AtomicU64,
    produced: AtomicU64,
    active: AtomicUsize,
    bus: Bus,
}

pub struct Source {
    id: ElementId,
    shared: Arc<Shared>,
    peer: Mutex<Option<Arc<FanOut>>>,
    state: Mutex<ElementState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Source {
    pub(crate) fn new(id: ElementId, name: String, config: SourceConfig, bus: Bus) -> Self {
        let payload = Bytes::from(vec![0u8; config.unit_size]);
        Self {
            id,
            shared: Arc::new(Shared {
                name,
                config,
                payload,
                running: AtomicBool::new(false),
                next_seq: AtomicU64::new(0),
                produced: AtomicU64::new(0),
                active: AtomicUsize::new(0),
                bus,
            }),
            peer: Mutex::new(None),
            state: Mutex::new(ElementState::Null),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ElementState {
        *lock(&self.state)
    }

    /// Units pushed downstream so far
    pub fn produced(&self) -> u64 {
        self.shared.produced.load(Ordering::Relaxed)
    }

    pub fn peer_name(&self) -> Option<String> {
        lock(&self.peer).as_ref().map(|f| f.name().to_string())
    }

    pub(crate) fn link(&self, fanout: Arc<FanOut>) -> Result<()> {
        let mut peer = lock(&self.peer);
        if peer.is_some() {
            return Err(GraphError::DownstreamTaken {
                element: self.shared.name.clone(),
            });
        }
        *peer = Some(fanout);
        Ok(())
    }

    pub(crate) fn set_state(&self, target: ElementState) -> Result<()> {
        let previous = std::mem::replace(&mut *lock(&self.state), target);
        match target {
            ElementState::Playing if previous != ElementState::Playing => self.start(),
            ElementState::Playing => Ok(()),
            _ => {
                self.signal_stop();
                Ok(())
            }
        }
    }

    fn start(&self) -> Result<()> {
        let Some(fanout) = lock(&self.peer).clone() else {
            self.shared.bus.post(BusMessage::error(
                self.shared.name.clone(),
                "internal data stream error: not-linked",
            ));
            return Ok(());
        };

        self.shared.running.store(true, Ordering::SeqCst);
        let worker_count = self.shared.config.workers.max(1);
        self.shared.active.store(worker_count, Ordering::SeqCst);

        let mut workers = lock(&self.workers);
        for index in 0..worker_count {
            let shared = self.shared.clone();
            let fanout = fanout.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}:worker{index}", self.shared.name))
                .spawn(move || produce(shared, fanout))
                .map_err(|source| GraphError::Spawn {
                    element: self.shared.name.clone(),
                    source,
                })?;
            workers.push(handle);
        }

        debug!(source = %self.shared.name, workers = worker_count, "source started");
        Ok(())
    }

    /// Ask the workers to stop after their current push
    pub(crate) fn signal_stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Wait for the workers. Call after downstream queues were closed, or a
    /// worker blocked on a full queue never returns.
    pub(crate) fn join(&self) {
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!(source = %self.shared.name, "source worker panicked");
            }
        }
    }
}

fn produce(shared: Arc<Shared>, fanout: Arc<FanOut>) {
    let interval = shared.config.unit_interval;
    let mut exhausted = false;

    while shared.running.load(Ordering::SeqCst) {
        let seq = shared.next_seq.fetch_add(1, Ordering::SeqCst);
        if shared.config.num_units.is_some_and(|limit| seq >= limit) {
            exhausted = true;
            break;
        }

        let pts = if interval.is_zero() {
            Duration::from_micros(seq)
        } else {
            interval * u32::try_from(seq).unwrap_or(u32::MAX)
        };
        let unit = DataUnit::new(seq, pts, shared.payload.clone());

        match fanout.chain(Item::Unit(unit)) {
            Ok(()) => {
                shared.produced.fetch_add(1, Ordering::Relaxed);
            }
            Err(FlowError::Flushing) => {
                trace!(source = %shared.name, "downstream flushing, worker exits");
                break;
            }
            Err(e) => {
                shared.bus.post(BusMessage::error(
                    shared.name.clone(),
                    format!("internal data stream error: {e}"),
                ));
                break;
            }
        }

        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    // Last worker out sends end-of-stream, but only when the data ran out
    if shared.active.fetch_sub(1, Ordering::SeqCst) == 1 && exhausted {
        debug!(source = %shared.name, "source exhausted, pushing eos");
        let _ = fanout.chain(Item::Eos);
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.shared.name)
            .field("produced", &self.produced())
            .finish()
    }
}
