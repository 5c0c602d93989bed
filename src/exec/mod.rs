//! Execution control
//!
//! Process-group lifecycle for compile/run stages, per-sample execution,
//! and run-level cancellation.

pub mod executor;
pub mod process;
pub mod signal;

pub use executor::{ExecutorSettings, IsolatedExecutor, SampleExecutor};
