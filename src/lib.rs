//! judgebox: sandboxed evaluation of untrusted code completions
//! Runs model-generated programs against their tests in isolated subprocesses
//! and reduces the outcomes to pass@k and related corpus metrics.
//!
//! # Architecture
//!
//! ## Sandbox Resolution ([`sandbox`])
//! - [`sandbox::resolver`]: Finite-state resolution of the run's sandbox mode
//! - [`sandbox::probe`]: Firejail detection and one-shot install
//! - [`sandbox::prompt`]: Interactive retry / proceed-unsandboxed / abort choice
//! - [`sandbox::firejail`]: Firejail argv construction for the isolated mode
//!
//! ## Execution Control ([`exec`])
//! - [`exec::executor`]: Policy, compile, and run stages for one completion
//! - [`exec::process`]: Process-group spawn, timeout kill, bounded capture
//! - [`exec::signal`]: Run-level cancellation from SIGINT/SIGTERM/SIGHUP
//!
//! ## Judge Adapters ([`judge`])
//! - [`judge::adapter`]: Language adapter contract
//! - [`judge::languages`]: Rust, Python and shell adapters
//! - [`judge::filter`]: Cheap pre-evaluation filter
//! - [`judge::policy`]: Regex deny-list scanner
//! - [`judge::problem`]: Test harness assembly from problem records
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::verdict`]: Stage report to outcome classification
//!
//! ## Scheduling and Metrics ([`pool`], [`aggregate`])
//! - [`pool::worker_pool`]: Bounded queue feeding a fixed set of worker threads
//! - [`aggregate::pass_at_k`]: Unbiased pass@k estimator
//! - [`aggregate::aggregator`]: Corpus metrics over the outcome set
//!
//! ## Results ([`report`])
//! - [`report::results`]: results.jsonl and metrics.json
//! - [`report::metadata`]: eval_metadata.json
//!
//! ## Support
//! - [`config`]: Configuration loading, validation and shared types
//! - [`safety::workspace`]: Per-sample scratch directories
//! - [`observability::metrics`]: Runtime counters for a pass
//! - [`utils`]: JSONL streaming and bounded output capture
//!
//! # Design Principles
//!
//! 1. **Resolve once** - The sandbox mode is decided before any code runs and
//!    passed explicitly afterwards
//! 2. **One outcome per input** - Filtering, cancellation and infrastructure
//!    failures still produce an outcome
//! 3. **Kill the group** - Timeouts and cancellation terminate the whole
//!    process group, never just the direct child
//! 4. **Unsandboxed is loud** - It needs an explicit token and is flagged in
//!    every result file

// Sandbox Resolution
pub mod sandbox;

// Execution Control
pub mod exec;

// Judge adapters (language-specific compile/run stages)
pub mod judge;

// Verdict
pub mod verdict;

// Scheduling
pub mod pool;

// Metrics
pub mod aggregate;

// Result files
pub mod report;

// Scratch directories
pub mod safety;

// Runtime counters
pub mod observability;

// Configuration & Types
pub mod config;

// Utilities
pub mod utils;

// CLI
pub mod cli;

pub use aggregate::{pass_at_k, AggregateMetrics, MetricsAggregator};
pub use config::loader::EvalConfig;
pub use config::types::{
    Completion, ErrorKind, ExecutionOutcome, FilteredAccounting, JudgeError, RequestedMode,
    Result, SandboxDecisionStatus, SandboxMode,
};
pub use exec::{IsolatedExecutor, SampleExecutor};
pub use judge::filter::SampleFilter;
pub use pool::EvaluationWorkerPool;
pub use sandbox::{SandboxDecision, SandboxResolver};
