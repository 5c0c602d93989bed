/// Isolation primitive detection and self-install
use crate::config::types::{JudgeError, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Presence check and one-shot install for the isolation primitive.
pub trait IsolationProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Present on PATH and functional
    fn is_available(&self) -> bool;

    fn install(&self) -> Result<()>;

    /// First line of the version banner, when available
    fn version(&self) -> Option<String> {
        None
    }
}

#[derive(Clone, Debug)]
pub struct FirejailProbe {
    binary: String,
    install_command: Vec<String>,
}

impl FirejailProbe {
    pub fn new(binary: impl Into<String>, install_command: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            install_command,
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        find_in_path(&self.binary)
    }
}

impl IsolationProbe for FirejailProbe {
    fn name(&self) -> &str {
        &self.binary
    }

    fn is_available(&self) -> bool {
        if self.locate().is_none() {
            return false;
        }

        Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn install(&self) -> Result<()> {
        let (program, args) = self.install_command.split_first().ok_or_else(|| {
            JudgeError::Sandbox("no install command configured".to_string())
        })?;

        log::info!("Attempting to install {}: {}", self.binary, self.install_command.join(" "));
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| JudgeError::Sandbox(format!("failed to run {}: {}", program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(JudgeError::Sandbox(format!(
                "install command exited with {}",
                status
            )))
        }
    }

    fn version(&self) -> Option<String> {
        first_output_line(&[self.binary.clone(), "--version".to_string()])
    }
}

/// Equivalent of `which`: absolute paths are checked directly, bare names
/// are searched on PATH.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Run a version command and keep its first non-empty line (stdout, then stderr).
pub fn first_output_line(argv: &[String]) -> Option<String> {
    let (program, args) = argv.split_first()?;
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let text = if output.stdout.iter().any(|b| !b.is_ascii_whitespace()) {
        String::from_utf8_lossy(&output.stdout).to_string()
    } else {
        String::from_utf8_lossy(&output.stderr).to_string()
    };
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path() {
        assert!(find_in_path("sh").is_some());
        assert_eq!(find_in_path("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert!(find_in_path("judgebox-definitely-not-installed").is_none());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let probe = FirejailProbe::new("judgebox-definitely-not-installed", vec![]);
        assert!(!probe.is_available());
        assert!(probe.version().is_none());
    }

    #[test]
    fn test_install_without_command_fails() {
        let probe = FirejailProbe::new("judgebox-definitely-not-installed", vec![]);
        assert!(matches!(probe.install(), Err(JudgeError::Sandbox(_))));
    }

    #[test]
    fn test_failing_install_command() {
        let probe = FirejailProbe::new("x", vec!["/bin/sh".to_string(), "-c".to_string(), "exit 1".to_string()]);
        assert!(probe.install().is_err());
    }

    #[test]
    fn test_first_output_line() {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "echo; echo v1.2; echo tail".to_string()];
        assert_eq!(first_output_line(&argv), Some("v1.2".to_string()));
    }
}
