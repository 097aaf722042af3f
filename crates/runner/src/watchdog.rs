//! Iteration watchdog

use std::pin::Pin;
use std::time::Duration;

use contracts::StressError;
use tokio::time::{sleep, Instant, Sleep};

#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    armed_at: Instant,
    sleep: Pin<Box<Sleep>>,
    fired: bool,
}

impl Watchdog {
    pub fn arm(timeout: Duration) -> Self {
        Self {
            timeout,
            armed_at: Instant::now(),
            sleep: Box::pin(sleep(timeout)),
            fired: false,
        }
    }

    /// Resolves once, when the deadline passes. Cancel safe.
    pub async fn expired(&mut self) {
        if self.fired {
            return std::future::pending().await;
        }
        self.sleep.as_mut().await;
        self.fired = true;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn elapsed(&self) -> Duration {
        self.armed_at.elapsed()
    }

    /// Disarm the watchdog.
    ///
    /// # Errors
    /// `RemovalFailed` if it already fired.
    pub fn cancel(self) -> Result<Duration, StressError> {
        if self.fired {
            return Err(StressError::removal_failed(
                "watchdog timer",
                format!("already fired after {:?}", self.timeout),
            ));
        }
        Ok(self.elapsed())
    }
}
