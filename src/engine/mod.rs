//! Execution engine for converge
//!
//! Wraps the declarative executor with a progress bar, an interactive
//! confirmation and a final summary.

pub mod executor;

pub use executor::{ApplyOptions, execute};
