/// Per-sample scratch directories
/// Every evaluated completion gets its own uuid-named directory under the
/// scratch root; nothing is shared between samples and the directory is
/// removed when the workspace is dropped.
use crate::config::types::{JudgeError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct Workspace {
    run_id: String,
    run_dir: PathBuf,
    source_file: Option<PathBuf>,
}

impl Workspace {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&run_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            JudgeError::Workspace(format!(
                "Failed to create workspace directory {}: {}",
                run_dir.display(),
                e
            ))
        })?;
        fs::set_permissions(&run_dir, fs::Permissions::from_mode(0o700))?;

        Ok(Self {
            run_id,
            run_dir,
            source_file: None,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }

    /// Path inside the workspace as an argv-ready string
    pub fn path_string(&self, name: &str) -> String {
        self.path(name).to_string_lossy().to_string()
    }

    pub fn create_source_file(&mut self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let source_path = self.run_dir.join(name);

        fs::write(&source_path, content).map_err(|e| {
            JudgeError::Workspace(format!(
                "Failed to write source file {}: {}",
                source_path.display(),
                e
            ))
        })?;

        self.source_file = Some(source_path.clone());
        Ok(source_path)
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Cleanup workspace (idempotent)
    pub fn cleanup(&self) -> Result<()> {
        if self.run_dir.exists() {
            remove_tree(&self.run_dir)?;
        }
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::warn!("Failed to remove workspace {}: {}", self.run_dir.display(), e);
        }
    }
}

/// Remove a directory tree. Programs may strip permissions from their own
/// files, so on failure owner access is restored and removal retried once.
fn remove_tree(path: &Path) -> Result<()> {
    if fs::remove_dir_all(path).is_ok() {
        return Ok(());
    }

    restore_owner_access(path);
    fs::remove_dir_all(path).map_err(|e| {
        JudgeError::Workspace(format!("Failed to remove {}: {}", path.display(), e))
    })
}

fn restore_owner_access(path: &Path) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };
    if !metadata.is_dir() {
        return;
    }

    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            restore_owner_access(&entry.path());
        }
    }
}

/// Owns the scratch root shared by all workspaces of a run
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            JudgeError::Workspace(format!(
                "Failed to create scratch root {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_workspace(&self) -> Result<Workspace> {
        Workspace::new(&self.base_dir)
    }

    /// Remove workspaces left behind by earlier runs that were killed outright
    pub fn cleanup_old_workspaces(&self, max_age: std::time::Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = std::time::SystemTime::now();

        let entries = fs::read_dir(&self.base_dir).map_err(|e| {
            JudgeError::Workspace(format!(
                "Failed to read scratch root {}: {}",
                self.base_dir.display(),
                e
            ))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(m) if path.is_dir() => m,
                _ => continue,
            };

            let age = match now.duration_since(modified) {
                Ok(d) => d,
                Err(_) => continue, // Future timestamp, skip
            };

            if age > max_age {
                log::info!("Cleaning up stale workspace: {}", path.display());
                match remove_tree(&path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => log::warn!("{}", e),
                }
            }
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_workspace_creation_and_drop() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().to_path_buf()).unwrap();

        let run_dir = {
            let mut workspace = manager.create_workspace().unwrap();
            let source = workspace.create_source_file("solution.rs", b"fn main() {}").unwrap();
            assert!(source.exists());
            assert_eq!(workspace.source_file(), Some(source.as_path()));
            workspace.run_dir().to_path_buf()
        };

        assert!(!run_dir.exists());
    }

    #[test]
    fn test_workspaces_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().to_path_buf()).unwrap();

        let a = manager.create_workspace().unwrap();
        let b = manager.create_workspace().unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a.run_dir(), b.run_dir());
    }

    #[test]
    fn test_cleanup_survives_stripped_permissions() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path()).unwrap();
        let locked = workspace.path("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("f"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        workspace.cleanup().unwrap();
        assert!(!workspace.run_dir().exists());
    }

    #[test]
    fn test_cleanup_old_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().to_path_buf()).unwrap();
        fs::create_dir(root.path().join("stale")).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let cleaned = manager.cleanup_old_workspaces(Duration::from_millis(1)).unwrap();
        assert_eq!(cleaned, 1);
        assert!(!root.path().join("stale").exists());
    }
}
