//! # tee-stress
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 场景加载与 CLI 覆盖
//! - 重复运行动态分支挂载测试
//! - 优雅关闭处理

mod cli;
mod commands;
mod summary;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::{error, info};

use cli::{Cli, Commands};
use commands::{run_stress, run_validate, RunStatus};

/// Option-parse failure
const EXIT_USAGE: u8 = 1;
/// An iteration errored or timed out, or the scenario was rejected
const EXIT_FAILED: u8 = 2;
/// Stopped by Ctrl+C / SIGTERM
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                // --help / --version
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = init_observability(&cli) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(EXIT_FAILED);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "tee-stress starting");

    let result = match &cli.command {
        Some(Commands::Validate(args)) => run_validate(args).map(|()| RunStatus::Passed),
        None => run_stress(&cli.run).await,
    };

    match result {
        Ok(RunStatus::Passed) => ExitCode::SUCCESS,
        Ok(RunStatus::Failed) => ExitCode::from(EXIT_FAILED),
        Ok(RunStatus::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Logging level from -v / -q, metrics exporter from --metrics-port
fn init_observability(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: (cli.run.metrics_port != 0).then_some(cli.run.metrics_port),
        default_log_level: default_log_level.to_string(),
    })
}
