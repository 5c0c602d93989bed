/// Evaluation configuration
/// Defaults, JSON file loading and CLI overrides are layered in that order
use crate::config::types::{
    FilteredAccounting, JudgeError, PolicyMode, RequestedMode, ResourceLimits, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Number of worker threads
    pub concurrency: usize,
    /// Per-sample wall-clock limit for the run stage
    pub timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub k_values: Vec<u32>,
    pub language: String,
    pub sandbox_mode: RequestedMode,
    /// Never persisted into result files
    #[serde(skip_serializing)]
    pub confirm_unsandboxed: Option<String>,
    pub policy: PolicyMode,
    pub filtered_accounting: FilteredAccounting,
    pub limits: ResourceLimits,
    /// Delay between SIGTERM and SIGKILL for a process group
    pub kill_grace_ms: u64,
    pub firejail_binary: String,
    pub install_command: Vec<String>,
    /// Extra read-only directories visible inside the sandbox
    pub toolchain_dirs: Vec<PathBuf>,
    pub scratch_root: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_ms: 10_000,
            compile_timeout_ms: 60_000,
            k_values: vec![1, 10, 100],
            language: "rust".to_string(),
            sandbox_mode: RequestedMode::Auto,
            confirm_unsandboxed: None,
            policy: PolicyMode::Off,
            filtered_accounting: FilteredAccounting::CountAsFailure,
            limits: ResourceLimits::default(),
            kill_grace_ms: 200,
            firejail_binary: "firejail".to_string(),
            install_command: vec![
                "apt-get".to_string(),
                "install".to_string(),
                "-y".to_string(),
                "firejail".to_string(),
            ],
            toolchain_dirs: Vec::new(),
            scratch_root: default_scratch_root(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_scratch_root() -> PathBuf {
    let uid = unsafe { libc::geteuid() };
    std::env::temp_dir().join(format!("judgebox-{}", uid))
}

impl EvalConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            JudgeError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| JudgeError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Parse a comma-separated k list such as "1,10,100"
    pub fn parse_k_values(raw: &str) -> Result<Vec<u32>> {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| JudgeError::Config(format!("invalid k value '{}'", part)))
            })
            .collect()
    }
}
