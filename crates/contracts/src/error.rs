//! Layered error definitions
//!
//! Categorized by source: config / structural / engine / timeout

use thiserror::Error;

use crate::ElementId;

/// Unified error type
#[derive(Debug, Error)]
pub enum StressError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Structural Errors =====
    /// The fan-out node could not be resolved
    #[error("fan-out node {element} is missing from pipeline '{pipeline}'")]
    FanOutMissing { pipeline: String, element: ElementId },

    /// Structural link failure
    #[error("failed to link '{from}' -> '{to}': {message}")]
    LinkFailed {
        from: String,
        to: String,
        message: String,
    },

    /// A resource (element, bus watch, timer) could not be released
    #[error("failed to remove {resource}: {message}")]
    RemovalFailed { resource: String, message: String },

    // ===== Engine Errors =====
    /// Error message received on the bus
    #[error("engine error from '{origin}': {message}")]
    Engine { origin: String, message: String },

    // ===== Timeout =====
    /// Watchdog expired before all branches completed
    #[error("pipeline '{pipeline}' timed out after {waited_ms}ms with {remaining} branches outstanding")]
    Timeout {
        pipeline: String,
        waited_ms: u64,
        remaining: u64,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Coarse error category, used for metrics labels and exit handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Structural,
    Engine,
    Timeout,
    Other,
}

impl StressError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create link failure
    pub fn link_failed(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::LinkFailed {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }

    /// Create removal failure
    pub fn removal_failed(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemovalFailed {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create engine error
    pub fn engine(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } => ErrorCategory::Config,
            Self::FanOutMissing { .. } | Self::LinkFailed { .. } | Self::RemovalFailed { .. } => {
                ErrorCategory::Structural
            }
            Self::Engine { .. } => ErrorCategory::Engine,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Io(_) | Self::Other(_) => ErrorCategory::Other,
        }
    }
}
