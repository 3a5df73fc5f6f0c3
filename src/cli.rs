//! Command-line interface components.

pub mod args;
pub mod commands;

pub use args::Args;
pub use commands::{RunSummary, run};
