//! DataUnit - the buffer type pushed through the graph.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One opaque data buffer.
///
/// Cloning only bumps the payload's reference count, so the fan-out node can
/// hand the same unit to every branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUnit {
    /// Sequence number assigned by the source (unique per graph run)
    pub seq: u64,

    /// Presentation timestamp, relative to the moment streaming started
    pub pts: Duration,

    /// Payload (zero-copy)
    pub payload: Bytes,
}

impl DataUnit {
    pub fn new(seq: u64, pts: Duration, payload: Bytes) -> Self {
        Self { seq, pts, payload }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_payload() {
        let unit = DataUnit::new(7, Duration::from_millis(70), Bytes::from(vec![1u8; 64]));
        let copy = unit.clone();
        assert_eq!(copy.payload.as_ptr(), unit.payload.as_ptr());
        assert_eq!(copy.len(), 64);
        assert!(!copy.is_empty());
    }
}
