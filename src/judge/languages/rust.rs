use crate::config::types::ResourceLimits;
use crate::judge::adapter::JudgeAdapter;
use crate::safety::workspace::Workspace;
use std::path::PathBuf;

const RUST_POLICY_RULES: &[(&str, &str)] = &[
    ("std::process", r"\bstd\s*::\s*process\b"),
    ("std::net", r"\bstd\s*::\s*net\b"),
    ("std::fs", r"\bstd\s*::\s*fs\b"),
    ("std::env", r"\bstd\s*::\s*env\b"),
    ("std::os", r"\bstd\s*::\s*os\s*::"),
    ("grouped std import", r"\bstd\s*::\s*\{[^;]*\b(process|net|fs|env|os)\b"),
    ("unsafe", r"\bunsafe\s*(\{|fn\b|impl\b|trait\b|extern\b)"),
    ("extern", r#"\bextern\s+("[^"]*"|crate\b|\{)"#),
    ("include", r"\binclude(_str|_bytes)?\s*!"),
    ("asm", r"\b(global_)?asm\s*!"),
    ("link attribute", r"#\s*\[\s*link\b"),
    ("libc", r"\blibc\s*::"),
];

/// `#[test]` with any interior whitespace, outside of line comments.
fn has_test_functions(program: &str) -> bool {
    program.lines().any(|line| {
        let code = line.split("//").next().unwrap_or_default();
        let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        compact.contains("#[test]")
    })
}

/// Programs with `#[test]` functions are built as a libtest harness; anything
/// else is a plain binary judged by the exit status of `main`.
#[derive(Debug, Clone, Default)]
pub struct RustAdapter {
    cargo_home: Option<PathBuf>,
    rustup_home: Option<PathBuf>,
}

impl RustAdapter {
    /// Resolve toolchain homes before the executor replaces `HOME`.
    pub fn from_env() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let resolve = |var: &str, fallback: &str| {
            std::env::var_os(var)
                .map(PathBuf::from)
                .or_else(|| home.as_ref().map(|h| h.join(fallback)))
        };

        Self {
            cargo_home: resolve("CARGO_HOME", ".cargo"),
            rustup_home: resolve("RUSTUP_HOME", ".rustup"),
        }
    }
}

impl JudgeAdapter for RustAdapter {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn source_file_name(&self) -> &'static str {
        "solution.rs"
    }

    fn compile_command(&self, workspace: &Workspace, program: &str) -> Option<Vec<String>> {
        let mut argv = vec![
            "rustc".to_string(),
            "--edition".to_string(),
            "2021".to_string(),
        ];
        if has_test_functions(program) {
            argv.push("--test".to_string());
        }
        argv.extend([
            "--crate-name".to_string(),
            "solution".to_string(),
            "-C".to_string(),
            "debuginfo=0".to_string(),
            "--cap-lints".to_string(),
            "allow".to_string(),
            "-o".to_string(),
            workspace.path_string("solution"),
            workspace.path_string(self.source_file_name()),
        ]);
        Some(argv)
    }

    fn run_command(&self, workspace: &Workspace, program: &str) -> Vec<String> {
        let mut argv = vec![workspace.path_string("solution")];
        if has_test_functions(program) {
            argv.push("--test-threads=1".to_string());
        }
        argv
    }

    fn vacuous_run(&self, stdout: &str) -> Option<&'static str> {
        stdout
            .lines()
            .any(|line| line.trim() == "running 0 tests")
            .then_some("test harness ran no tests")
    }

    fn compile_limits(&self, run_limits: &ResourceLimits) -> ResourceLimits {
        // rustc and the linker reserve far more address space than they touch.
        ResourceLimits {
            memory_limit: run_limits.memory_limit.map(|m| m.max(4096 * 1024 * 1024)),
            process_limit: run_limits.process_limit.map(|p| p.max(512)),
            ..run_limits.clone()
        }
    }

    fn environment(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(cargo_home) = &self.cargo_home {
            env.push(("CARGO_HOME".to_string(), cargo_home.to_string_lossy().to_string()));
        }
        if let Some(rustup_home) = &self.rustup_home {
            env.push(("RUSTUP_HOME".to_string(), rustup_home.to_string_lossy().to_string()));
        }
        if let Ok(toolchain) = std::env::var("RUSTUP_TOOLCHAIN") {
            env.push(("RUSTUP_TOOLCHAIN".to_string(), toolchain));
        }
        env
    }

    fn toolchain_dirs(&self) -> Vec<PathBuf> {
        self.cargo_home
            .iter()
            .chain(self.rustup_home.iter())
            .cloned()
            .collect()
    }

    fn policy_rules(&self) -> &'static [(&'static str, &'static str)] {
        RUST_POLICY_RULES
    }

    fn version_command(&self) -> Vec<String> {
        vec!["rustc".to_string(), "--version".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_limits_raise_headroom() {
        let adapter = RustAdapter::default();
        let run = ResourceLimits::default();
        let compile = adapter.compile_limits(&run);
        assert!(compile.memory_limit >= run.memory_limit);
        assert_eq!(compile.process_limit, Some(512));
        assert_eq!(compile.file_size_limit, run.file_size_limit);
    }

    #[test]
    fn test_plain_program_builds_without_harness() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path()).unwrap();
        let adapter = RustAdapter::default();
        let program = "fn main() { assert_eq!(1 + 1, 3); }";

        let compile = adapter.compile_command(&workspace, program).unwrap();
        assert!(!compile.contains(&"--test".to_string()));
        assert_eq!(adapter.run_command(&workspace, program).len(), 1);
    }

    #[test]
    fn test_test_functions_select_harness() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path()).unwrap();
        let adapter = RustAdapter::default();
        let program = "fn f() -> u8 { 1 }\n# [ test ]\nfn check() { assert_eq!(f(), 1); }";

        let compile = adapter.compile_command(&workspace, program).unwrap();
        assert!(compile.contains(&"--test".to_string()));
        assert!(adapter
            .run_command(&workspace, program)
            .contains(&"--test-threads=1".to_string()));
        assert!(!has_test_functions("// #[test] is disabled\nfn main() {}"));
    }

    #[test]
    fn test_empty_harness_run_is_vacuous() {
        let adapter = RustAdapter::default();
        let stdout = "\nrunning 0 tests\n\ntest result: ok. 0 passed; 0 failed\n";
        assert!(adapter.vacuous_run(stdout).is_some());
        assert!(adapter.vacuous_run("running 2 tests\ntest check ... ok\n").is_none());
    }

    #[test]
    fn test_toolchain_homes_exported() {
        let adapter = RustAdapter {
            cargo_home: Some(PathBuf::from("/opt/cargo")),
            rustup_home: Some(PathBuf::from("/opt/rustup")),
        };
        let env = adapter.environment();
        assert!(env.contains(&("CARGO_HOME".to_string(), "/opt/cargo".to_string())));
        assert_eq!(adapter.toolchain_dirs().len(), 2);
    }
}
