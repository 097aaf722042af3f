//! Branch attachment schedule

use std::time::Duration;

use contracts::AttachMode;
use tokio::time::{sleep_until, Instant};

/// Fires `branch_count - 1` times.
///
/// In burst mode every attachment becomes due one interval after start and
/// the loop then drains them one per turn. In staggered mode the k-th
/// attachment is due at `k * interval`.
#[derive(Debug)]
pub struct AttachSchedule {
    mode: AttachMode,
    interval: Duration,
    pending: u32,
    next_due: Instant,
}

impl AttachSchedule {
    pub fn new(mode: AttachMode, interval: Duration, attachments: u32) -> Self {
        Self {
            mode,
            interval,
            pending: attachments,
            next_due: Instant::now() + interval,
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending == 0
    }

    /// Wait for the next attachment to become due
    pub async fn due(&self) {
        sleep_until(self.next_due).await;
    }

    /// Consume one due attachment
    pub fn advance(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        if self.mode == AttachMode::Staggered {
            self.next_due += self.interval;
        }
    }
}
