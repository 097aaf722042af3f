//! Per-branch buffer counter

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts units consumed by one branch and detects the quota crossing.
///
/// Updated from the streaming thread of the branch's queue.
#[derive(Debug)]
pub struct BufferCounter {
    count: AtomicU64,
    quota: u64,
}

impl BufferCounter {
    pub fn new(quota: u64) -> Self {
        Self {
            count: AtomicU64::new(0),
            quota,
        }
    }

    /// Record one consumed unit. Returns `true` on the unit that reaches the quota.
    pub fn on_unit_consumed(&self) -> bool {
        self.record(1)
    }

    /// Record `n` consumed units at once.
    ///
    /// Returns `true` for exactly one call over the counter's lifetime: the one
    /// whose increment takes the count from below the quota to at or above it.
    pub fn record(&self, n: u64) -> bool {
        if n == 0 {
            return false;
        }
        let prev = self.count.fetch_add(n, Ordering::AcqRel);
        prev < self.quota && prev.saturating_add(n) >= self.quota
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn reached(&self) -> bool {
        self.count() >= self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_signals_on_quota_only() {
        let counter = BufferCounter::new(3);
        assert!(!counter.on_unit_consumed());
        assert!(!counter.on_unit_consumed());
        assert!(counter.on_unit_consumed());
        assert!(!counter.on_unit_consumed());
        assert_eq!(counter.count(), 4);
        assert!(counter.reached());
    }

    #[test]
    fn test_batch_jumping_over_quota() {
        let counter = BufferCounter::new(5);
        assert!(!counter.record(3));
        assert!(counter.record(4));
        assert!(!counter.record(10));
        assert!(!counter.record(0));
    }

    #[test]
    fn test_single_crossing_across_threads() {
        let counter = Arc::new(BufferCounter::new(500));
        let crossings = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                let crossings = crossings.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if counter.on_unit_consumed() {
                            crossings.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(crossings.load(Ordering::SeqCst), 1);
        assert_eq!(counter.count(), 1600);
    }

    proptest! {
        #[test]
        fn prop_exactly_one_crossing(quota in 1u64..200, batches in prop::collection::vec(1u64..20, 1..100)) {
            let counter = BufferCounter::new(quota);
            let crossings = batches.iter().filter(|&&n| counter.record(n)).count();
            let total: u64 = batches.iter().sum();
            prop_assert_eq!(crossings, usize::from(total >= quota));
        }
    }
}
