//! Observability
//!
//! Runtime counters for operational visibility during a run.

pub mod metrics;
