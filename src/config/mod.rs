//! Configuration
//!
//! Shared types, configuration loading, and startup validation.

pub mod loader;
pub mod types;
pub mod validator;
