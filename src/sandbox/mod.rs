//! Sandbox resolution and confinement
//!
//! Decides once per run whether samples execute under Firejail or directly
//! on the host, and builds the Firejail wrapper for isolated stages.

pub mod firejail;
pub mod probe;
pub mod prompt;
pub mod resolver;

pub use resolver::{SandboxDecision, SandboxResolver};
