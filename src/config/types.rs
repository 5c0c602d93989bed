/// Shared type definitions for judgebox
/// Closed enums for sandbox resolution, filtering and per-sample outcomes
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Literal text an operator must supply before code runs without a sandbox.
pub const CONFIRMATION_TOKEN: &str = "I UNDERSTAND THE RISKS";

/// Sandbox mode requested by the operator (CLI flag or config file)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedMode {
    Auto,
    Isolated,
    #[serde(rename = "none")]
    Unsandboxed,
}

impl Default for RequestedMode {
    fn default() -> Self {
        Self::Auto
    }
}

impl FromStr for RequestedMode {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "isolated" | "firejail" => Ok(Self::Isolated),
            "none" | "unsandboxed" => Ok(Self::Unsandboxed),
            other => Err(JudgeError::Config(format!(
                "unknown sandbox mode '{}' (expected auto, isolated or none)",
                other
            ))),
        }
    }
}

impl fmt::Display for RequestedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Isolated => write!(f, "isolated"),
            Self::Unsandboxed => write!(f, "none"),
        }
    }
}

/// Resolved sandbox mode. Produced once per run and passed to every executor call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    Unresolved,
    Isolated,
    Unsandboxed,
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::Isolated => write!(f, "isolated"),
            Self::Unsandboxed => write!(f, "unsandboxed"),
        }
    }
}

/// Outcome of sandbox resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxDecisionStatus {
    Ready,
    InstallFailed,
    UserDeclined,
    Unsandboxed,
}

impl SandboxDecisionStatus {
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::InstallFailed | Self::UserDeclined)
    }
}

impl fmt::Display for SandboxDecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::InstallFailed => write!(f, "install_failed"),
            Self::UserDeclined => write!(f, "user_declined"),
            Self::Unsandboxed => write!(f, "unsandboxed"),
        }
    }
}

/// One candidate solution for one task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub task_id: String,
    pub sample_index: u32,
    #[serde(rename = "completion", alias = "source_text")]
    pub source_text: String,
}

impl Completion {
    pub fn new(task_id: impl Into<String>, sample_index: u32, source_text: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            sample_index,
            source_text: source_text.into(),
        }
    }
}

/// Reason a completion was rejected before evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    Empty,
    TooShort,
    UnbalancedDelimiters,
}

impl FilterReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooShort => "too_short",
            Self::UnbalancedDelimiters => "unbalanced_delimiters",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterVerdict {
    pub kept: bool,
    pub reason: Option<FilterReason>,
}

impl FilterVerdict {
    pub fn kept() -> Self {
        Self {
            kept: true,
            reason: None,
        }
    }

    pub fn rejected(reason: FilterReason) -> Self {
        Self {
            kept: false,
            reason: Some(reason),
        }
    }
}

/// Per-sample failure classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CompileError,
    Timeout,
    PolicyViolation,
    RuntimeFailure,
    FilteredPreEvaluation,
    Cancelled,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CompileError => "compile_error",
            Self::Timeout => "timeout",
            Self::PolicyViolation => "policy_violation",
            Self::RuntimeFailure => "runtime_failure",
            Self::FilteredPreEvaluation => "filtered_pre_evaluation",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

/// Result of evaluating one completion. Exactly one per input completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub task_id: String,
    pub sample_index: u32,
    pub passed: bool,
    pub compiled: bool,
    pub timed_out: bool,
    pub policy_violation: bool,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_reason: Option<FilterReason>,
    /// Matched policy rule, compiler diagnostics head, or infrastructure error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecutionOutcome {
    fn failed(completion: &Completion, error_kind: ErrorKind) -> Self {
        Self {
            task_id: completion.task_id.clone(),
            sample_index: completion.sample_index,
            passed: false,
            compiled: false,
            timed_out: false,
            policy_violation: false,
            error_kind: Some(error_kind),
            duration_ms: 0,
            filter_reason: None,
            detail: None,
        }
    }

    pub fn filtered(completion: &Completion, reason: FilterReason) -> Self {
        let mut outcome = Self::failed(completion, ErrorKind::FilteredPreEvaluation);
        outcome.filter_reason = Some(reason);
        outcome
    }

    pub fn policy_violation(completion: &Completion, rule: &str) -> Self {
        let mut outcome = Self::failed(completion, ErrorKind::PolicyViolation);
        outcome.policy_violation = true;
        outcome.detail = Some(rule.to_string());
        outcome
    }

    pub fn cancelled(completion: &Completion) -> Self {
        Self::failed(completion, ErrorKind::Cancelled)
    }

    pub fn internal_error(completion: &Completion, detail: impl Into<String>) -> Self {
        let mut outcome = Self::failed(completion, ErrorKind::InternalError);
        outcome.detail = Some(detail.into());
        outcome
    }

    pub fn key(&self) -> (&str, u32) {
        (&self.task_id, self.sample_index)
    }

    pub fn is_filtered(&self) -> bool {
        self.error_kind == Some(ErrorKind::FilteredPreEvaluation)
    }
}

/// How filtered completions enter pass@k denominators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilteredAccounting {
    CountAsFailure,
    Exclude,
}

impl Default for FilteredAccounting {
    fn default() -> Self {
        Self::CountAsFailure
    }
}

impl FromStr for FilteredAccounting {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "count-as-failure" | "count" => Ok(Self::CountAsFailure),
            "exclude" => Ok(Self::Exclude),
            other => Err(JudgeError::Config(format!(
                "unknown filtered accounting '{}' (expected count-as-failure or exclude)",
                other
            ))),
        }
    }
}

/// Policy enforcement passes to run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Off,
    On,
    Both,
}

impl Default for PolicyMode {
    fn default() -> Self {
        Self::Off
    }
}

impl PolicyMode {
    /// Policy-enforcement flags in execution order
    pub fn passes(self) -> Vec<bool> {
        match self {
            Self::Off => vec![false],
            Self::On => vec![true],
            Self::Both => vec![false, true],
        }
    }
}

impl FromStr for PolicyMode {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "both" => Ok(Self::Both),
            other => Err(JudgeError::Config(format!(
                "unknown policy mode '{}' (expected on, off or both)",
                other
            ))),
        }
    }
}

/// Resource ceilings applied to every evaluated program
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Address-space ceiling in bytes
    pub memory_limit: Option<u64>,
    pub process_limit: Option<u32>,
    /// Largest file the program may write, in bytes
    pub file_size_limit: Option<u64>,
    /// Captured bytes per output stream
    pub output_limit: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_limit: Some(2048 * 1024 * 1024),
            process_limit: Some(256),
            file_size_limit: Some(64 * 1024 * 1024),
            output_limit: 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    /// CPU-second ceiling derived from a wall-clock timeout
    pub fn cpu_seconds_for(timeout: Duration) -> u64 {
        timeout.as_secs() + 1
    }
}

/// Judgebox error types
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sandbox resolution error: {0}")]
    Sandbox(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Evaluation interrupted by signal {0}")]
    Interrupted(i32),
}

pub type Result<T> = std::result::Result<T, JudgeError>;
