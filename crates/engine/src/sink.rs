//! Application sink
//!
//! Terminal element. Renders units on the streaming thread of the queue in
//! front of it and, when `emit_units` is set, hands every unit to the
//! application callback synchronously on that same thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use contracts::{DataUnit, ElementId, ElementState};
use tracing::trace;

use crate::clock::GraphClock;
use crate::error::{FlowError, GraphError, Result};
use crate::queue::Item;
use crate::sync::lock;

/// Per-unit application callback.
///
/// Runs on a streaming thread: keep it short and never call back into the
/// graph's structural API from here.
pub type UnitCallback = Arc<dyn Fn(&DataUnit) -> std::result::Result<(), FlowError> + Send + Sync>;

pub(crate) type EosNotify = Arc<dyn Fn() + Send + Sync>;

/// Sink configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Pace rendering against the graph clock using each unit's pts
    pub sync: bool,

    /// Invoke the unit callback for every rendered unit
    pub emit_units: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sync: true,
            emit_units: false,
        }
    }
}

impl SinkConfig {
    /// Callback per unit, no real-time pacing
    pub fn unpaced() -> Self {
        Self {
            sync: false,
            emit_units: true,
        }
    }
}

pub struct AppSink {
    id: ElementId,
    name: String,
    config: SinkConfig,
    callback: Mutex<Option<UnitCallback>>,
    upstream: Mutex<Option<String>>,
    state: Mutex<ElementState>,
    consumed: AtomicU64,
    eos: AtomicBool,
    clock: Arc<GraphClock>,
    on_eos: EosNotify,
}

impl AppSink {
    pub(crate) fn new(
        id: ElementId,
        name: String,
        config: SinkConfig,
        clock: Arc<GraphClock>,
        on_eos: EosNotify,
    ) -> Self {
        Self {
            id,
            name,
            config,
            callback: Mutex::new(None),
            upstream: Mutex::new(None),
            state: Mutex::new(ElementState::Null),
            consumed: AtomicU64::new(0),
            eos: AtomicBool::new(false),
            clock,
            on_eos,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> SinkConfig {
        self.config
    }

    pub fn state(&self) -> ElementState {
        *lock(&self.state)
    }

    /// Units rendered so far
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::SeqCst)
    }

    /// Connect the per-unit callback, replacing any previous one
    pub fn set_callback(&self, callback: UnitCallback) {
        *lock(&self.callback) = Some(callback);
    }

    pub(crate) fn set_state(&self, state: ElementState) {
        *lock(&self.state) = state;
    }

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

    pub(crate) fn render(&self, item: Item) -> std::result::Result<(), FlowError> {
        match item {
            Item::Unit(unit) => {
                if self.config.sync {
                    self.wait_for(&unit);
                }
                self.consumed.fetch_add(1, Ordering::Relaxed);

                if self.config.emit_units {
                    let callback = lock(&self.callback).clone();
                    if let Some(callback) = callback {
                        callback(&unit)?;
                    }
                }
                Ok(())
            }
            Item::Eos => {
                if !self.eos.swap(true, Ordering::SeqCst) {
                    trace!(sink = %self.name, "sink received eos");
                    (self.on_eos)();
                }
                Ok(())
            }
        }
    }

    fn wait_for(&self, unit: &DataUnit) {
        let due = self.clock.base_time() + unit.pts;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}

impl std::fmt::Debug for AppSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSink")
            .field("name", &self.name)
            .field("consumed", &self.consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sink(config: SinkConfig, eos_calls: Arc<AtomicU64>) -> AppSink {
        AppSink::new(
            ElementId(0),
            "appsink0".into(),
            config,
            Arc::new(GraphClock::new()),
            Arc::new(move || {
                eos_calls.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn unit(seq: u64, pts: Duration) -> Item {
        Item::Unit(DataUnit::new(seq, pts, bytes::Bytes::from_static(b"u")))
    }

    #[test]
    fn test_callback_per_unit() {
        let sink = sink(SinkConfig::unpaced(), Arc::default());
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        sink.set_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        for seq in 0..5 {
            sink.render(unit(seq, Duration::ZERO)).unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(sink.consumed(), 5);
    }

    #[test]
    fn test_callback_error_propagates() {
        let sink = sink(SinkConfig::unpaced(), Arc::default());
        sink.set_callback(Arc::new(|_| Err(FlowError::Error)));
        assert_eq!(sink.render(unit(0, Duration::ZERO)), Err(FlowError::Error));
    }

    #[test]
    fn test_eos_notifies_once() {
        let calls = Arc::new(AtomicU64::new(0));
        let sink = sink(SinkConfig::unpaced(), calls.clone());
        sink.render(Item::Eos).unwrap();
        sink.render(Item::Eos).unwrap();
        assert!(sink.is_eos());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_paces_by_pts() {
        let sink = sink(SinkConfig::default(), Arc::default());
        let start = Instant::now();
        // base time is fixed on first use
        let _ = sink.clock.base_time();
        sink.render(unit(0, Duration::from_millis(30))).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_single_upstream() {
        let sink = sink(SinkConfig::default(), Arc::default());
        sink.claim_upstream("queue0").unwrap();
        assert!(sink.claim_upstream("queue1").is_err());
    }
}
