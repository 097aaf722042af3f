//! GraphSnapshot - diagnostic view of a running graph
//!
//! Produced by the engine on demand and rendered to side files by
//! observability when something goes wrong.

use serde::{Deserialize, Serialize};

use crate::{ElementId, ElementState, LinkState, PortId};

/// Element category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Source,
    FanOut,
    Queue,
    Sink,
}

/// Whole-graph snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Graph (pipeline) name
    pub name: String,

    /// Graph state at capture time
    pub state: ElementState,

    /// Elements in insertion order
    pub elements: Vec<ElementSnapshot>,

    /// Established links (upstream element name -> downstream element name)
    pub links: Vec<LinkSnapshot>,
}

/// One element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub id: ElementId,
    pub name: String,
    pub kind: ElementKind,
    pub state: ElementState,

    /// Units produced / forwarded / consumed, depending on kind
    pub units: u64,

    /// Request ports (fan-out only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSnapshot>,
}

/// One fan-out request port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub id: PortId,
    pub state: LinkState,
    pub peer: Option<String>,
    /// How many times a structural link was attempted on this port
    pub link_calls: u32,
    /// Logical time of the successful link
    pub linked_at: Option<u64>,
    /// Logical time of the first unit delivered through the port
    pub first_delivery_at: Option<u64>,
    pub deliveries: u64,
    pub pending_probes: usize,
}

impl PortSnapshot {
    /// True when no unit went through the port before it was linked
    pub fn delivery_ordered(&self) -> bool {
        match (self.linked_at, self.first_delivery_at) {
            (_, None) => true,
            (Some(linked), Some(first)) => linked < first,
            (None, Some(_)) => false,
        }
    }
}

/// One link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub from: String,
    pub to: String,
}

impl GraphSnapshot {
    /// Find an element by name
    pub fn element(&self, name: &str) -> Option<&ElementSnapshot> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Count elements of a kind
    pub fn count(&self, kind: ElementKind) -> usize {
        self.elements.iter().filter(|e| e.kind == kind).count()
    }
}
