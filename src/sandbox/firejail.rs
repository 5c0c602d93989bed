/// Firejail command wrapping
/// Builds the argv prefix that confines one stage: no network, a read-only
/// host, a writable private scratch directory, and resource ceilings.
use crate::config::types::ResourceLimits;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct FirejailCommand {
    binary: String,
    toolchain_dirs: Vec<PathBuf>,
}

impl FirejailCommand {
    /// Directories that do not exist are dropped; firejail refuses to whitelist them.
    pub fn new(binary: impl Into<String>, toolchain_dirs: Vec<PathBuf>) -> Self {
        let toolchain_dirs = toolchain_dirs
            .into_iter()
            .filter(|dir| dir.is_dir())
            .collect();

        Self {
            binary: binary.into(),
            toolchain_dirs,
        }
    }

    pub fn toolchain_dirs(&self) -> &[PathBuf] {
        &self.toolchain_dirs
    }

    pub fn wrap(
        &self,
        scratch_dir: &Path,
        limits: &ResourceLimits,
        timeout: Duration,
        argv: &[String],
    ) -> Vec<String> {
        let scratch = scratch_dir.to_string_lossy();
        let mut wrapped = vec![
            self.binary.clone(),
            "--quiet".to_string(),
            "--noprofile".to_string(),
            "--net=none".to_string(),
            "--nonewprivs".to_string(),
            "--noroot".to_string(),
            "--caps.drop=all".to_string(),
            "--seccomp".to_string(),
            "--private-dev".to_string(),
            "--nosound".to_string(),
            "--read-only=/".to_string(),
            format!("--whitelist={}", scratch),
            format!("--read-write={}", scratch),
        ];

        for dir in &self.toolchain_dirs {
            let dir = dir.to_string_lossy();
            wrapped.push(format!("--whitelist={}", dir));
            wrapped.push(format!("--read-only={}", dir));
        }

        if let Some(bytes) = limits.memory_limit {
            wrapped.push(format!("--rlimit-as={}", bytes));
        }
        if let Some(count) = limits.process_limit {
            wrapped.push(format!("--rlimit-nproc={}", count));
        }
        if let Some(bytes) = limits.file_size_limit {
            wrapped.push(format!("--rlimit-fsize={}", bytes));
        }
        wrapped.push(format!(
            "--rlimit-cpu={}",
            ResourceLimits::cpu_seconds_for(timeout)
        ));

        wrapped.push("--".to_string());
        wrapped.extend(argv.iter().cloned());
        wrapped
    }
}
