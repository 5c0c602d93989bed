use crate::judge::adapter::JudgeAdapter;
use crate::safety::workspace::Workspace;

const SHELL_POLICY_RULES: &[(&str, &str)] = &[
    ("network tool", r"\b(curl|wget|nc|ssh)\b"),
    ("recursive delete", r"\brm\s+-[a-zA-Z]*r"),
];

/// Interpreted by `/bin/sh`; no compile stage and no toolchain beyond the base system.
#[derive(Debug, Clone, Default)]
pub struct ShellAdapter;

impl JudgeAdapter for ShellAdapter {
    fn language(&self) -> &'static str {
        "shell"
    }

    fn source_file_name(&self) -> &'static str {
        "solution.sh"
    }

    fn compile_command(&self, _workspace: &Workspace, _program: &str) -> Option<Vec<String>> {
        None
    }

    fn run_command(&self, workspace: &Workspace, _program: &str) -> Vec<String> {
        vec![
            "/bin/sh".to_string(),
            workspace.path_string(self.source_file_name()),
        ]
    }

    fn policy_rules(&self) -> &'static [(&'static str, &'static str)] {
        SHELL_POLICY_RULES
    }

    fn version_command(&self) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), "echo sh".to_string()]
    }
}
