//! Bus messages and run-loop events
//!
//! Engine threads never run controller logic themselves. Everything they want
//! the controller to know is turned into a message and posted to the loop.

use serde::{Deserialize, Serialize};

use crate::{BranchId, ElementState};

/// Message posted on the engine bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    /// Fatal problem reported by an element
    Error { source: String, message: String },

    /// Non-fatal problem reported by an element
    Warning { source: String, message: String },

    /// Every sink in the graph received end-of-stream
    Eos { source: String },

    /// The graph changed state
    StateChanged {
        source: String,
        old: ElementState,
        new: ElementState,
    },
}

impl BusMessage {
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Warning {
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn eos(source: impl Into<String>) -> Self {
        Self::Eos {
            source: source.into(),
        }
    }

    /// Name of the element that posted the message
    pub fn source(&self) -> &str {
        match self {
            Self::Error { source, .. }
            | Self::Warning { source, .. }
            | Self::Eos { source }
            | Self::StateChanged { source, .. } => source,
        }
    }

    /// Short category label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Warning { .. } => "warning",
            Self::Eos { .. } => "eos",
            Self::StateChanged { .. } => "state_changed",
        }
    }
}

/// Event consumed by the single-threaded run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Forwarded engine bus message
    Bus(BusMessage),

    /// A branch's counter crossed its quota; run the completion check
    QuotaReached { branch: BranchId },

    /// Wake the loop so it notices a stop request
    Wakeup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_and_kind() {
        let msg = BusMessage::error("queue3", "not negotiated");
        assert_eq!(msg.source(), "queue3");
        assert_eq!(msg.kind(), "error");
        assert_eq!(BusMessage::eos("pipeline").kind(), "eos");
    }

    #[test]
    fn test_serialize_tagged() {
        let msg = BusMessage::warning("queue1", "overrun");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"warning\""));
        let back: BusMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
