//! Graph clock
//!
//! Two notions of time live here: the wall-clock base used by sinks that pace
//! delivery, and a logical clock that totally orders link and delivery events
//! across threads for instrumentation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct GraphClock {
    logical: AtomicU64,
    base: OnceLock<Instant>,
}

impl GraphClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the logical clock. The first tick returns 1, so 0 can mean "never".
    pub fn tick(&self) -> u64 {
        self.logical.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current logical time
    pub fn now(&self) -> u64 {
        self.logical.load(Ordering::SeqCst)
    }

    /// Wall-clock instant streaming started, fixed on first call
    pub fn base_time(&self) -> Instant {
        *self.base.get_or_init(Instant::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_unique_across_threads() {
        let clock = std::sync::Arc::new(GraphClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..1000).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(all[0], 1);
        assert_eq!(clock.now(), 4000);
    }

    #[test]
    fn test_base_time_fixed() {
        let clock = GraphClock::new();
        let first = clock.base_time();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(clock.base_time(), first);
    }
}
