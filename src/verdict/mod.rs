//! Verdict classification
//!
//! Derives per-stage verdicts as pure functions over stage reports.

pub mod verdict;
