use crate::config::types::ResourceLimits;
use crate::safety::workspace::Workspace;
use std::path::PathBuf;

/// Judge adapter contract for language-specific compile/run stages.
pub trait JudgeAdapter: Send + Sync {
    fn language(&self) -> &'static str;

    /// File name the assembled program is written to inside the workspace
    fn source_file_name(&self) -> &'static str;

    /// `None` for languages without a compile stage.
    fn compile_command(&self, workspace: &Workspace, program: &str) -> Option<Vec<String>>;

    fn run_command(&self, workspace: &Workspace, program: &str) -> Vec<String>;

    /// Reason a clean exit still proves nothing, read from the run's stdout.
    fn vacuous_run(&self, _stdout: &str) -> Option<&'static str> {
        None
    }

    /// Compile needs more headroom than the run envelope for most toolchains.
    fn compile_limits(&self, run_limits: &ResourceLimits) -> ResourceLimits {
        run_limits.clone()
    }

    /// Variables added on top of the scrubbed base environment
    fn environment(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Host directories the toolchain needs read-only access to inside the sandbox
    fn toolchain_dirs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Regex deny-list applied when policy enforcement is on, as (rule name, pattern)
    fn policy_rules(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Command printing the toolchain version, for dependency checks and run metadata
    fn version_command(&self) -> Vec<String>;
}
