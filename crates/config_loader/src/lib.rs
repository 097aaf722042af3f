//! # Config Loader
//!
//! Scenario configuration loading.
//!
//! Responsibilities:
//! - Parse TOML/JSON scenario files
//! - Validate value ranges and schedule feasibility
//! - Produce a `ScenarioConfig` ready for the runner
//!
//! Every field has a default, so an empty file yields the reference scenario
//! (200 branches, quota 20, 500 ms attach interval, 35 s watchdog).
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("scenario.toml")).unwrap();
//! println!("branches: {}", config.branch_count);
//! ```

mod parser;
mod validator;

pub use contracts::ScenarioConfig;
pub use parser::ConfigFormat;

use contracts::StressError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ScenarioConfig, StressError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<ScenarioConfig, StressError> {
        let config = parser::parse(content, format)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration assembled elsewhere (e.g. from CLI overrides)
    pub fn validate(config: &ScenarioConfig) -> Result<(), StressError> {
        validator::validate(config)
    }

    /// Serialize ScenarioConfig to TOML string
    pub fn to_toml(config: &ScenarioConfig) -> Result<String, StressError> {
        toml::to_string_pretty(config)
            .map_err(|e| StressError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ScenarioConfig to JSON string
    pub fn to_json(config: &ScenarioConfig) -> Result<String, StressError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| StressError::config_parse(format!("JSON serialize error: {e}")))
    }

    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, StressError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            StressError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| StressError::config_parse(format!("unsupported config format: .{ext}")))
    }
}
