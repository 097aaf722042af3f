//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AttachMode, ScenarioConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ScenarioSummary>,
}

#[derive(Serialize)]
struct ScenarioSummary {
    iterations: u64,
    branch_count: u32,
    quota: u64,
    attach_mode: AttachMode,
    attach_interval_ms: u64,
    watchdog_timeout_ms: u64,
    source_workers: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating scenario");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Scenario validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ScenarioSummary {
                    iterations: config.iterations,
                    branch_count: config.branch_count,
                    quota: config.quota,
                    attach_mode: config.attach_mode,
                    attach_interval_ms: config.attach_interval_ms,
                    watchdog_timeout_ms: config.watchdog_timeout_ms,
                    source_workers: config.source.workers,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Non-fatal issues
fn collect_warnings(config: &ScenarioConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.diagnostics_dir.is_none() {
        warnings.push("diagnostics_dir not set - failures will not leave graph snapshots".to_string());
    }

    if config.branch_count == 1 {
        warnings.push("branch_count = 1 - no branch is attached while streaming".to_string());
    }

    if let Some(units) = config.source.num_units {
        if units < config.quota {
            warnings.push(format!(
                "source.num_units ({units}) < quota ({}) - iterations can only end on EOS",
                config.quota
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Scenario is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Iterations: {}", summary.iterations);
            println!("  Branches: {}", summary.branch_count);
            println!("  Quota: {}", summary.quota);
            println!(
                "  Attach: {:?} every {} ms",
                summary.attach_mode, summary.attach_interval_ms
            );
            println!("  Watchdog: {} ms", summary.watchdog_timeout_ms);
            println!("  Source workers: {}", summary.source_workers);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Scenario is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}
