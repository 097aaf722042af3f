//! Graph message bus
//!
//! Elements post messages from whatever thread they run on. A single watch
//! receives them; the run controller installs one that forwards each message
//! into its event loop. Messages posted while no watch is installed are
//! dropped.

use std::sync::{Arc, Mutex};

use contracts::BusMessage;
use tracing::trace;

use crate::error::{GraphError, Result};
use crate::sync::lock;

type Watch = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Cheap-to-clone handle to a graph's bus
#[derive(Clone, Default)]
pub struct Bus {
    watch: Arc<Mutex<Option<Watch>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the watch
    ///
    /// # Errors
    /// `WatchInstalled` if a watch is already present
    pub fn add_watch<F>(&self, watch: F) -> Result<()>
    where
        F: Fn(BusMessage) + Send + Sync + 'static,
    {
        let mut slot = lock(&self.watch);
        if slot.is_some() {
            return Err(GraphError::WatchInstalled);
        }
        *slot = Some(Arc::new(watch));
        Ok(())
    }

    /// Remove the watch
    ///
    /// # Errors
    /// `NoWatch` if nothing was installed
    pub fn remove_watch(&self) -> Result<()> {
        lock(&self.watch)
            .take()
            .map(|_| ())
            .ok_or(GraphError::NoWatch)
    }

    pub fn has_watch(&self) -> bool {
        lock(&self.watch).is_some()
    }

    /// Post a message. Returns whether a watch received it.
    ///
    /// The watch runs on the posting thread, outside the bus lock.
    pub fn post(&self, message: BusMessage) -> bool {
        let watch = lock(&self.watch).clone();
        match watch {
            Some(watch) => {
                watch(message);
                true
            }
            None => {
                trace!(kind = message.kind(), source = message.source(), "no bus watch, message dropped");
                false
            }
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("has_watch", &self.has_watch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_single_watch() {
        let bus = Bus::new();
        assert!(bus.add_watch(|_| {}).is_ok());
        assert!(matches!(bus.add_watch(|_| {}), Err(GraphError::WatchInstalled)));
    }

    #[test]
    fn test_remove_without_watch_fails() {
        let bus = Bus::new();
        assert!(matches!(bus.remove_watch(), Err(GraphError::NoWatch)));
        bus.add_watch(|_| {}).unwrap();
        assert!(bus.remove_watch().is_ok());
        assert!(!bus.has_watch());
    }

    #[test]
    fn test_post_reaches_watch() {
        let bus = Bus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        assert!(!bus.post(BusMessage::eos("pipeline")));

        let counter = seen.clone();
        bus.add_watch(move |msg| {
            assert_eq!(msg.kind(), "warning");
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let clone = bus.clone();
        std::thread::spawn(move || clone.post(BusMessage::warning("queue0", "overrun")))
            .join()
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
