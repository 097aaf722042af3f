//! Typed handles
//!
//! Handles are returned when an element, port or branch is created and are
//! passed around afterwards instead of looking things up by name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to an element inside a graph container.
///
/// Handles are never reused within one graph, so a stale handle simply fails
/// to resolve after the element has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// Handle to a request port on a fan-out node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub u32);

/// Identifier of a consumer branch within one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src_{}", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ElementId(3).to_string(), "element#3");
        assert_eq!(PortId(0).to_string(), "src_0");
        assert_eq!(BranchId(12).to_string(), "branch12");
    }
}
