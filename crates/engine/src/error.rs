//! Engine error types

use contracts::{ElementId, ElementKind, PortId};
use thiserror::Error;

/// Structural graph errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// No element with this handle in the container
    #[error("element {0} not found")]
    ElementNotFound(ElementId),

    /// Handle resolves to an element of another kind
    #[error("element {id} is a {actual:?}, expected {expected:?}")]
    WrongKind {
        id: ElementId,
        expected: ElementKind,
        actual: ElementKind,
    },

    /// Unknown request port
    #[error("port {port} not found on '{fanout}'")]
    PortNotFound { fanout: String, port: PortId },

    /// Port already has a peer
    #[error("port '{port}' is already linked")]
    PortAlreadyLinked { port: String },

    /// Element already has an upstream peer
    #[error("'{element}' is already linked to upstream '{peer}'")]
    UpstreamTaken { element: String, peer: String },

    /// Element already has a downstream peer
    #[error("'{element}' already has a downstream peer")]
    DownstreamTaken { element: String },

    /// The two element kinds cannot be linked in this direction
    #[error("cannot link {from:?} to {to:?}")]
    IncompatibleLink { from: ElementKind, to: ElementKind },

    /// A bus watch is already installed
    #[error("bus already has a watch")]
    WatchInstalled,

    /// No bus watch to remove
    #[error("bus has no watch")]
    NoWatch,

    /// Streaming thread could not be started
    #[error("failed to spawn streaming thread for '{element}': {source}")]
    Spawn {
        element: String,
        #[source]
        source: std::io::Error,
    },

    /// Streaming thread panicked
    #[error("streaming thread of '{0}' panicked")]
    WorkerPanicked(String),
}

/// Data-flow result of pushing one item downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Element is shutting down
    #[error("flushing")]
    Flushing,

    /// No downstream peer
    #[error("not-linked")]
    NotLinked,

    /// Downstream reported a fatal error
    #[error("error")]
    Error,
}

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
