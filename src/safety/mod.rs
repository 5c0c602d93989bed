//! Safety and cleanup
//!
//! Run-scoped scratch directories that never outlive their sample.

pub mod workspace;
