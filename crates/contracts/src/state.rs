//! State enums shared by the engine and the run controller

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element / graph streaming state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    /// No resources allocated, no threads running
    #[default]
    Null,
    /// Resources allocated, not streaming
    Ready,
    /// Prerolled, not streaming
    Paused,
    /// Streaming threads running
    Playing,
}

impl ElementState {
    /// Whether worker threads are expected to run in this state
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Ready => "ready",
            Self::Paused => "paused",
            Self::Playing => "playing",
        };
        f.write_str(s)
    }
}

/// Link state of a fan-out request port.
///
/// Transitions only move forward: `Unlinked -> Linking -> Linked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Unlinked,
    /// Someone claimed the port and is performing the structural link
    Linking,
    Linked,
}

/// Run controller states for a single iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Timeout,
    TornDown,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::TornDown => "torn_down",
        };
        f.write_str(s)
    }
}

/// How an iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Error,
    Timeout,
}

impl RunOutcome {
    /// Error and Timeout abort the repeat loop
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Label used for metrics and log fields
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => Self::Completed,
            RunOutcome::Error => Self::Error,
            RunOutcome::Timeout => Self::Timeout,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
