//! ScenarioConfig - Config Loader output
//!
//! Describes one stress scenario: how many iterations, how many branches per
//! iteration, the per-branch quota, timing, and how the source produces data.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Reference number of test iterations
pub const DEFAULT_ITERATIONS: u64 = 100_000;
/// Reference number of branches per iteration (initial branch included)
pub const DEFAULT_BRANCH_COUNT: u32 = 200;
/// Reference per-branch quota
pub const DEFAULT_QUOTA: u64 = 20;
/// Reference attachment interval
pub const DEFAULT_ATTACH_INTERVAL_MS: u64 = 500;
/// Reference watchdog timeout
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 35_000;

/// Full scenario configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScenarioConfig {
    /// Number of iterations executed by the repeat loop
    #[serde(default = "default_iterations")]
    #[validate(range(min = 1))]
    pub iterations: u64,

    /// Branches per iteration, the statically linked one included
    #[serde(default = "default_branch_count")]
    #[validate(range(min = 1))]
    pub branch_count: u32,

    /// Units each branch must consume
    #[serde(default = "default_quota")]
    #[validate(range(min = 1))]
    pub quota: u64,

    /// Interval between attachments (ms)
    #[serde(default = "default_attach_interval_ms")]
    pub attach_interval_ms: u64,

    /// How attachments are spread over time
    #[serde(default)]
    pub attach_mode: AttachMode,

    /// Watchdog timeout (ms)
    #[serde(default = "default_watchdog_timeout_ms")]
    #[validate(range(min = 1))]
    pub watchdog_timeout_ms: u64,

    /// Capacity of each branch queue (units)
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Source settings
    #[serde(default)]
    #[validate(nested)]
    pub source: SourceSettings,

    /// Where diagnostic snapshots are written (None = disabled)
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
}

/// When the branch attachments become due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    /// Every attachment becomes due one interval after start
    #[default]
    Burst,
    /// The k-th attachment becomes due after k intervals
    Staggered,
}

/// Source element settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SourceSettings {
    /// Pause between units produced by one worker (us, 0 = as fast as downstream allows)
    #[serde(default = "default_unit_interval_us")]
    pub unit_interval_us: u64,

    /// Payload size of each unit (bytes)
    #[serde(default = "default_unit_size")]
    #[validate(range(min = 1))]
    pub unit_size: usize,

    /// Stop with end-of-stream after this many units (None = unlimited)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub num_units: Option<u64>,

    /// Number of producer threads pushing into the fan-out concurrently
    #[serde(default = "default_workers")]
    #[validate(range(min = 1, max = 64))]
    pub workers: usize,
}

fn default_iterations() -> u64 {
    DEFAULT_ITERATIONS
}

fn default_branch_count() -> u32 {
    DEFAULT_BRANCH_COUNT
}

fn default_quota() -> u64 {
    DEFAULT_QUOTA
}

fn default_attach_interval_ms() -> u64 {
    DEFAULT_ATTACH_INTERVAL_MS
}

fn default_watchdog_timeout_ms() -> u64 {
    DEFAULT_WATCHDOG_TIMEOUT_MS
}

fn default_queue_capacity() -> usize {
    200
}

fn default_unit_interval_us() -> u64 {
    1_000
}

fn default_unit_size() -> usize {
    1024
}

fn default_workers() -> usize {
    1
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            branch_count: default_branch_count(),
            quota: default_quota(),
            attach_interval_ms: default_attach_interval_ms(),
            attach_mode: AttachMode::default(),
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            source: SourceSettings::default(),
            diagnostics_dir: None,
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            unit_interval_us: default_unit_interval_us(),
            unit_size: default_unit_size(),
            num_units: None,
            workers: default_workers(),
        }
    }
}

impl ScenarioConfig {
    pub fn attach_interval(&self) -> Duration {
        Duration::from_millis(self.attach_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    /// Number of branches attached at runtime (all but the initial one)
    pub fn attachments(&self) -> u32 {
        self.branch_count.saturating_sub(1)
    }
}

impl SourceSettings {
    pub fn unit_interval(&self) -> Duration {
        Duration::from_micros(self.unit_interval_us)
    }
}
