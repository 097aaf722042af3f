//! # Engine
//!
//! A small in-process streaming engine: sources push sequence-numbered units
//! into a fan-out node, the fan-out offers each unit to every request port,
//! and linked ports hand it to a queue whose own streaming thread renders it
//! into a sink.
//!
//! The pieces the stress harness relies on:
//! - request ports can be created and linked while data is flowing
//! - a blocking probe on a port runs on the pushing thread before any unit
//!   crosses that port
//! - elements added mid-run follow the graph state via
//!   [`Graph::sync_state_with_parent`]
//! - every element reports errors and warnings on a single [`Bus`]
//!
//! Ports stamp link and delivery events with a graph-wide logical clock so
//! tests can check ordering after the fact.

mod bus;
mod clock;
mod error;
mod fanout;
mod graph;
mod port;
mod queue;
mod sink;
mod source;
mod sync;

pub use bus::Bus;
pub use clock::GraphClock;
pub use error::{FlowError, GraphError, Result};
pub use fanout::FanOut;
pub use graph::{Element, Graph, WeakGraph};
pub use port::{Probe, ProbeId, ProbeReturn, SrcPort};
pub use queue::{Queue, QueueConfig};
pub use sink::{AppSink, SinkConfig, UnitCallback};
pub use source::{Source, SourceConfig};
