//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tee-stress - dynamic tee-branch attachment stress test
#[derive(Parser, Debug)]
#[command(
    name = "tee-stress",
    author,
    version,
    about = "Stress test for attaching branches to a live fan-out node",
    long_about = "Builds a streaming graph (source -> tee -> queue -> sink), attaches \n\
                  consumer branches to the tee while data flows, and verifies every \n\
                  branch is linked before its first unit and reaches its quota.\n\n\
                  The whole cycle is repeated --number-times times; the run stops at \n\
                  the first iteration that errors or times out.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TEE_STRESS_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "TEE_STRESS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Available CLI commands (running the test needs none)
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a scenario file without running
    Validate(ValidateArgs),
}

/// Arguments for running the stress test
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Number of test iterations [default: 100000]
    #[arg(short = 'n', long, env = "TEE_STRESS_NUMBER_TIMES")]
    pub number_times: Option<u64>,

    /// Scenario file (TOML or JSON); flags below override its values
    #[arg(short, long, env = "TEE_STRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Branches per iteration, the initial one included
    #[arg(long, env = "TEE_STRESS_BRANCHES")]
    pub branches: Option<u32>,

    /// Units each branch must consume
    #[arg(long, env = "TEE_STRESS_QUOTA")]
    pub quota: Option<u64>,

    /// Delay before attaching dynamic branches
    #[arg(long, env = "TEE_STRESS_ATTACH_INTERVAL_MS")]
    pub attach_interval_ms: Option<u64>,

    /// How dynamic attachments are spread over time
    #[arg(long, value_enum, env = "TEE_STRESS_ATTACH_MODE")]
    pub attach_mode: Option<AttachModeArg>,

    /// Watchdog deadline per iteration
    #[arg(long, env = "TEE_STRESS_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Source streaming threads
    #[arg(long, env = "TEE_STRESS_WORKERS")]
    pub workers: Option<usize>,

    /// Directory for graph snapshots on error, warning and timeout
    #[arg(long, env = "TEE_STRESS_DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TEE_STRESS_METRICS_PORT")]
    pub metrics_port: u16,

    /// Print the effective scenario and exit without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to scenario file to validate
    #[arg(short, long, default_value = "scenario.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Attachment schedule
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachModeArg {
    /// All attachments fire together once the interval elapses
    Burst,
    /// One attachment per interval
    Staggered,
}

impl From<AttachModeArg> for contracts::AttachMode {
    fn from(mode: AttachModeArg) -> Self {
        match mode {
            AttachModeArg::Burst => Self::Burst,
            AttachModeArg::Staggered => Self::Staggered,
        }
    }
}
