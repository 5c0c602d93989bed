//! Utilities
//!
//! Bounded output collection and streaming JSONL input/output.

pub mod jsonl;
pub mod output;
