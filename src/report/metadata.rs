/// Run metadata
/// Enough about the host, toolchain and configuration to tell two result
/// directories apart.
use crate::config::loader::EvalConfig;
use crate::config::types::Result;
use crate::judge::adapter::JudgeAdapter;
use crate::report::results::atomic_write;
use crate::sandbox::probe::first_output_line;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "eval_metadata.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalMetadata {
    pub host: String,
    pub os: String,
    pub arch: String,
    pub tool_version: String,
    pub language: String,
    pub toolchain_version: Option<String>,
    pub sandbox_version: Option<String>,
    pub config_fingerprint: String,
    /// "no-policy" and/or "policy", in the order they ran
    pub policy_modes: Vec<String>,
    pub malformed_input_lines: usize,
    pub started_at: String,
    pub finished_at: String,
}

impl EvalMetadata {
    pub fn collect(
        config: &EvalConfig,
        adapter: &dyn JudgeAdapter,
        sandbox_version: Option<String>,
        policy_passes: &[bool],
        malformed_input_lines: usize,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self> {
        let host = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            host,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            language: adapter.language().to_string(),
            toolchain_version: first_output_line(&adapter.version_command()),
            sandbox_version,
            config_fingerprint: config_fingerprint(config)?,
            policy_modes: policy_passes
                .iter()
                .map(|&enforced| pass_label(enforced).to_string())
                .collect(),
            malformed_input_lines,
            started_at: started_at.to_rfc3339(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(METADATA_FILE);
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(&path, content.as_bytes())?;
        Ok(path)
    }
}

/// Directory name for a policy pass when both passes run
pub fn pass_label(policy_enforced: bool) -> &'static str {
    if policy_enforced {
        "policy"
    } else {
        "no-policy"
    }
}

/// SHA-256 over the canonical JSON of the effective configuration
pub fn config_fingerprint(config: &EvalConfig) -> Result<String> {
    let canonical = serde_json::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::languages::shell::ShellAdapter;

    #[test]
    fn test_fingerprint_tracks_config() {
        let base = EvalConfig::default();
        let mut changed = base.clone();
        changed.timeout_ms += 1;

        let fingerprint = config_fingerprint(&base).unwrap();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, config_fingerprint(&base.clone()).unwrap());
        assert_ne!(fingerprint, config_fingerprint(&changed).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_confirmation_token() {
        let base = EvalConfig::default();
        let mut confirmed = base.clone();
        confirmed.confirm_unsandboxed = Some("I UNDERSTAND THE RISKS".to_string());
        assert_eq!(
            config_fingerprint(&base).unwrap(),
            config_fingerprint(&confirmed).unwrap()
        );
    }

    #[test]
    fn test_collect_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = EvalMetadata::collect(
            &EvalConfig::default(),
            &ShellAdapter,
            None,
            &[false, true],
            2,
            chrono::Utc::now(),
        )
        .unwrap();

        assert_eq!(metadata.policy_modes, vec!["no-policy", "policy"]);
        assert_eq!(metadata.language, "shell");
        assert_eq!(metadata.toolchain_version.as_deref(), Some("sh"));
        assert_eq!(metadata.os, std::env::consts::OS);

        let path = metadata.write(dir.path()).unwrap();
        let back: EvalMetadata =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, metadata);
    }
}
