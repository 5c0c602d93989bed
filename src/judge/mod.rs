//! Judge adapters and pre-execution checks.
//!
//! The executor stays language-agnostic. Adapters define compile/run commands,
//! toolchain visibility and policy rules for each language; the filter and
//! policy scanner decide whether a program is worth running at all.

pub mod adapter;
pub mod filter;
pub mod languages;
pub mod policy;
pub mod problem;
pub mod registry;

pub use registry::adapter_for;
