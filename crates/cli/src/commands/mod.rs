//! Command implementations.

mod run;
mod validate;

pub use run::{run_stress, RunStatus};
pub use validate::run_validate;
