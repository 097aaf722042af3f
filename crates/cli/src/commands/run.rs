//! Default command: run the stress test.

use anyhow::{Context, Result};
use contracts::ScenarioConfig;
use config_loader::ConfigLoader;
use runner::{RunSummary, Runner};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::summary::print_summary;

/// How a run ended, for the exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    Failed,
    Interrupted,
}

/// Execute the stress test
pub async fn run_stress(args: &RunArgs) -> Result<RunStatus> {
    let config = resolve_config(args)?;

    info!(
        iterations = config.iterations,
        branches = config.branch_count,
        quota = config.quota,
        attach_interval_ms = config.attach_interval_ms,
        attach_mode = ?config.attach_mode,
        watchdog_ms = config.watchdog_timeout_ms,
        "Scenario loaded"
    );

    if args.dry_run {
        info!("Dry run mode - scenario is valid, exiting");
        println!("{}", ConfigLoader::to_toml(&config)?);
        return Ok(RunStatus::Passed);
    }

    let runner = Runner::new(config);
    let shutdown_signal = setup_shutdown_signal();

    tokio::select! {
        summary = runner.run() => {
            print_summary(&summary);
            Ok(status_of(&summary))
        }
        _ = shutdown_signal => {
            // Dropping the run future tears the current pipeline down
            warn!("Received shutdown signal, stopping stress run...");
            Ok(RunStatus::Interrupted)
        }
    }
}

fn status_of(summary: &RunSummary) -> RunStatus {
    if summary.is_success() {
        RunStatus::Passed
    } else {
        RunStatus::Failed
    }
}

/// Scenario file (or defaults), then CLI overrides, then validation
pub fn resolve_config(args: &RunArgs) -> Result<ScenarioConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading scenario");
            ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load scenario from {}", path.display()))?
        }
        None => ScenarioConfig::default(),
    };

    apply_overrides(&mut config, args);
    ConfigLoader::validate(&config).context("Invalid scenario after applying CLI overrides")?;
    Ok(config)
}

fn apply_overrides(config: &mut ScenarioConfig, args: &RunArgs) {
    if let Some(n) = args.number_times {
        config.iterations = n;
    }
    if let Some(branches) = args.branches {
        config.branch_count = branches;
    }
    if let Some(quota) = args.quota {
        config.quota = quota;
    }
    if let Some(interval) = args.attach_interval_ms {
        config.attach_interval_ms = interval;
    }
    if let Some(mode) = args.attach_mode {
        config.attach_mode = mode.into();
    }
    if let Some(secs) = args.timeout_secs {
        config.watchdog_timeout_ms = secs.saturating_mul(1000);
    }
    if let Some(workers) = args.workers {
        config.source.workers = workers;
    }
    if let Some(dir) = &args.dump_dir {
        config.diagnostics_dir = Some(dir.clone());
    }
}

/// Ctrl+C and SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::AttachModeArg;
    use contracts::AttachMode;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve_config(&RunArgs::default()).unwrap();
        assert_eq!(config, ScenarioConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, "branch_count = 10\nquota = 7\n").unwrap();

        let args = RunArgs {
            config: Some(path),
            quota: Some(2),
            number_times: Some(3),
            attach_mode: Some(AttachModeArg::Staggered),
            attach_interval_ms: Some(10),
            dump_dir: Some(PathBuf::from("/tmp/tee-dumps")),
            ..Default::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.branch_count, 10);
        assert_eq!(config.quota, 2);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.attach_mode, AttachMode::Staggered);
        assert_eq!(config.diagnostics_dir, Some(PathBuf::from("/tmp/tee-dumps")));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = RunArgs {
            branches: Some(0),
            ..Default::default()
        };
        let err = resolve_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("branch_count"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let args = RunArgs {
            config: Some(PathBuf::from("/nonexistent/scenario.toml")),
            ..Default::default()
        };
        let err = resolve_config(&args).unwrap_err();
        assert!(err.to_string().contains("Failed to load scenario"));
    }

    #[tokio::test]
    async fn test_small_run_passes() {
        let args = RunArgs {
            number_times: Some(2),
            branches: Some(3),
            quota: Some(2),
            attach_interval_ms: Some(0),
            timeout_secs: Some(10),
            ..Default::default()
        };
        assert_eq!(run_stress(&args).await.unwrap(), RunStatus::Passed);
    }
}
