use crate::judge::adapter::JudgeAdapter;
use crate::safety::workspace::Workspace;

const PYTHON_POLICY_RULES: &[(&str, &str)] = &[
    ("os", r"\bimport\s+os\b|\bfrom\s+os\b"),
    ("subprocess", r"\bsubprocess\b"),
    ("socket", r"\bsocket\b"),
    ("shutil", r"\bshutil\b"),
    ("ctypes", r"\bctypes\b"),
    ("dynamic import", r"\b__import__\s*\("),
    ("eval/exec", r"\b(eval|exec)\s*\("),
    ("open", r"\bopen\s*\("),
];

#[derive(Debug, Clone, Default)]
pub struct PythonAdapter;

impl JudgeAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn source_file_name(&self) -> &'static str {
        "solution.py"
    }

    fn compile_command(&self, _workspace: &Workspace, _program: &str) -> Option<Vec<String>> {
        None
    }

    fn run_command(&self, workspace: &Workspace, _program: &str) -> Vec<String> {
        vec![
            "python3".to_string(),
            "-B".to_string(),
            workspace.path_string(self.source_file_name()),
        ]
    }

    fn policy_rules(&self) -> &'static [(&'static str, &'static str)] {
        PYTHON_POLICY_RULES
    }

    fn version_command(&self) -> Vec<String> {
        vec!["python3".to_string(), "--version".to_string()]
    }
}
