//! Run context
//!
//! Everything a loop handler needs, passed explicitly instead of living in
//! process-wide statics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::Sender;
use branching::Pipeline;
use contracts::LoopEvent;

#[derive(Clone)]
pub struct RunContext {
    events: Sender<LoopEvent>,
    stop: Arc<AtomicBool>,
    error: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
}

impl RunContext {
    pub fn new(events: Sender<LoopEvent>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            events,
            stop: Arc::new(AtomicBool::new(false)),
            error: Arc::new(AtomicBool::new(false)),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Ask the loop to stop after the current turn. Callable from any thread.
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            let _ = self.events.try_send(LoopEvent::Wakeup);
        }
    }

    /// Flag the iteration as failed and stop the loop
    pub fn fail(&self) {
        self.error.store(true, Ordering::SeqCst);
        self.request_stop();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn has_failed(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("pipeline", &self.pipeline.name())
            .field("stopping", &self.is_stopping())
            .field("failed", &self.has_failed())
            .finish()
    }
}
