//! # Contracts
//!
//! Shared interface contracts for the tee stress harness. Every other crate in
//! the workspace depends on this one; it depends on none of them.
//!
//! ## Vocabulary
//! - a *unit* is one opaque data buffer flowing through the graph
//! - a *branch* is a queue + sink pair hanging off one fan-out port
//! - the *quota* is how many units a branch must consume before it counts as done

mod error;
mod ids;
mod message;
mod scenario;
mod snapshot;
mod state;
mod unit;

pub use error::*;
pub use ids::{BranchId, ElementId, PortId};
pub use message::*;
pub use scenario::*;
pub use snapshot::*;
pub use state::*;
pub use unit::DataUnit;
