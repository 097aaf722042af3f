//! Completion tracker
//!
//! One per pipeline. Counts down the branches that still have to reach their
//! quota; the transition to zero happens exactly once.

use std::sync::atomic::{AtomicU64, Ordering};

/// Result of one completion check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Still waiting for this many branches
    Progress(u64),
    /// This check took the counter to zero
    Done,
    /// The counter was already zero
    AlreadyDone,
}

#[derive(Debug)]
pub struct CompletionTracker {
    planned: u64,
    remaining: AtomicU64,
}

impl CompletionTracker {
    pub fn new(planned: u64) -> Self {
        Self {
            planned,
            remaining: AtomicU64::new(planned),
        }
    }

    /// Decrement the remaining-branches counter, never below zero
    pub fn check_and_maybe_complete(&self) -> Completion {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match prev {
            Ok(1) => Completion::Done,
            Ok(n) => Completion::Progress(n - 1),
            Err(_) => Completion::AlreadyDone,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn planned(&self) -> u64 {
        self.planned
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}
