//! # Branching
//!
//! Grows a fan-out graph while data flows through it and tracks when every
//! branch has consumed its quota.
//!
//! - [`attach_branch`] adds a queue + sink pair and reserves a fan-out port
//!   guarded by a [`BlockingGuard`]
//! - the guard links the port from the first data thread that reaches it
//! - each branch's [`BufferCounter`] posts `LoopEvent::QuotaReached` once
//! - the run loop answers with [`Pipeline::check_and_maybe_complete`], which
//!   counts the [`CompletionTracker`] down to zero exactly once

mod attacher;
mod branch;
mod counter;
mod error;
mod guard;
mod pipeline;
mod tracker;

pub use attacher::attach_branch;
pub use branch::BranchDescriptor;
pub use counter::BufferCounter;
pub use error::{AttachError, Result};
pub use guard::{install_guard, BlockingGuard};
pub use pipeline::Pipeline;
pub use tracker::{Completion, CompletionTracker};
