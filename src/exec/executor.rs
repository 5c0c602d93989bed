/// Per-sample execution
/// Policy check, compile, and run for one completion, in its own scratch
/// workspace, under the sandbox mode resolved for the run.
use crate::config::types::{
    Completion, ExecutionOutcome, Result, ResourceLimits, SandboxMode,
};
use crate::exec::process::{ProcessRunner, StageCommand};
use crate::exec::signal::ShutdownSignal;
use crate::judge::adapter::JudgeAdapter;
use crate::judge::policy::PolicyScanner;
use crate::judge::problem::ProblemSet;
use crate::safety::workspace::{Workspace, WorkspaceManager};
use crate::sandbox::firejail::FirejailCommand;
use crate::verdict::verdict::{Verdict, VerdictClassifier};
use std::path::PathBuf;
use std::time::Duration;

/// Seam between the worker pool and whatever evaluates a single completion.
/// Infrastructure failures are reported as outcomes, never as errors.
pub trait SampleExecutor: Send + Sync {
    fn execute(
        &self,
        completion: &Completion,
        mode: SandboxMode,
        timeout: Duration,
        limits: &ResourceLimits,
    ) -> ExecutionOutcome;
}

#[derive(Clone, Debug)]
pub struct ExecutorSettings {
    pub compile_timeout: Duration,
    pub kill_grace: Duration,
    pub enforce_policy: bool,
    pub firejail_binary: String,
    pub extra_toolchain_dirs: Vec<PathBuf>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            compile_timeout: Duration::from_secs(60),
            kill_grace: Duration::from_millis(200),
            enforce_policy: false,
            firejail_binary: "firejail".to_string(),
            extra_toolchain_dirs: Vec::new(),
        }
    }
}

pub struct IsolatedExecutor {
    adapter: Box<dyn JudgeAdapter>,
    workspaces: WorkspaceManager,
    problems: ProblemSet,
    policy: Option<PolicyScanner>,
    firejail: FirejailCommand,
    runner: ProcessRunner,
    compile_timeout: Duration,
}

impl IsolatedExecutor {
    pub fn new(
        adapter: Box<dyn JudgeAdapter>,
        scratch_root: PathBuf,
        settings: ExecutorSettings,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        let policy = if settings.enforce_policy {
            Some(PolicyScanner::new(adapter.policy_rules())?)
        } else {
            None
        };

        let mut toolchain_dirs = adapter.toolchain_dirs();
        toolchain_dirs.extend(settings.extra_toolchain_dirs);

        Ok(Self {
            workspaces: WorkspaceManager::new(scratch_root)?,
            problems: ProblemSet::new(),
            policy,
            firejail: FirejailCommand::new(settings.firejail_binary, toolchain_dirs),
            runner: ProcessRunner::new(settings.kill_grace, shutdown),
            compile_timeout: settings.compile_timeout,
            adapter,
        })
    }

    pub fn with_problems(mut self, problems: ProblemSet) -> Self {
        self.problems = problems;
        self
    }

    pub fn policy_enforced(&self) -> bool {
        self.policy.is_some()
    }

    pub fn language(&self) -> &'static str {
        self.adapter.language()
    }

    fn stage(
        &self,
        workspace: &Workspace,
        argv: Vec<String>,
        mode: SandboxMode,
        timeout: Duration,
        limits: &ResourceLimits,
    ) -> StageCommand {
        let (argv, apply_rlimits) = match mode {
            SandboxMode::Isolated => (
                self.firejail.wrap(workspace.run_dir(), limits, timeout, &argv),
                false,
            ),
            _ => (argv, true),
        };

        StageCommand {
            argv,
            workdir: workspace.run_dir().to_path_buf(),
            environment: self.adapter.environment(),
            timeout,
            limits: limits.clone(),
            apply_rlimits,
        }
    }

    fn try_execute(
        &self,
        completion: &Completion,
        mode: SandboxMode,
        timeout: Duration,
        limits: &ResourceLimits,
    ) -> Result<ExecutionOutcome> {
        let program = self.problems.assemble(completion);

        if let Some(rule) = self.policy.as_ref().and_then(|p| p.scan(&program)) {
            return Ok(ExecutionOutcome::policy_violation(completion, rule));
        }

        let mut workspace = self.workspaces.create_workspace()?;
        workspace.create_source_file(self.adapter.source_file_name(), program.as_bytes())?;

        if let Some(argv) = self.adapter.compile_command(&workspace, &program) {
            let compile_limits = self.adapter.compile_limits(limits);
            let stage = self.stage(&workspace, argv, mode, self.compile_timeout, &compile_limits);
            let report = self.runner.run(&stage)?;
            if let Some(verdict) = VerdictClassifier::classify_compile(&report) {
                return Ok(outcome_from(completion, verdict));
            }
        }

        let argv = self.adapter.run_command(&workspace, &program);
        let stage = self.stage(&workspace, argv, mode, timeout, limits);
        let report = self.runner.run(&stage)?;
        let mut verdict = VerdictClassifier::classify_run(&report, true);
        if verdict.passed {
            if let Some(reason) = self.adapter.vacuous_run(&report.stdout.text()) {
                verdict = VerdictClassifier::vacuous(verdict.duration, reason);
            }
        }
        Ok(outcome_from(completion, verdict))
    }
}

impl SampleExecutor for IsolatedExecutor {
    fn execute(
        &self,
        completion: &Completion,
        mode: SandboxMode,
        timeout: Duration,
        limits: &ResourceLimits,
    ) -> ExecutionOutcome {
        if mode == SandboxMode::Unresolved {
            return ExecutionOutcome::internal_error(
                completion,
                "refusing to execute with an unresolved sandbox mode",
            );
        }

        let outcome = match self.try_execute(completion, mode, timeout, limits) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!(
                    "Infrastructure failure for {}#{}: {}",
                    completion.task_id,
                    completion.sample_index,
                    e
                );
                ExecutionOutcome::internal_error(completion, e.to_string())
            }
        };

        log::debug!(
            "{}#{} passed={} error_kind={:?} duration_ms={}",
            outcome.task_id,
            outcome.sample_index,
            outcome.passed,
            outcome.error_kind,
            outcome.duration_ms
        );
        outcome
    }
}

fn outcome_from(completion: &Completion, verdict: Verdict) -> ExecutionOutcome {
    ExecutionOutcome {
        task_id: completion.task_id.clone(),
        sample_index: completion.sample_index,
        passed: verdict.passed,
        compiled: verdict.compiled,
        timed_out: verdict.timed_out,
        policy_violation: false,
        error_kind: verdict.error_kind,
        duration_ms: verdict.duration.as_millis() as u64,
        filter_reason: None,
        detail: verdict.detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ErrorKind;
    use crate::judge::languages::shell::ShellAdapter;
    use crate::judge::problem::Problem;

    fn executor(root: &std::path::Path, enforce_policy: bool) -> IsolatedExecutor {
        let settings = ExecutorSettings {
            enforce_policy,
            kill_grace: Duration::from_millis(50),
            ..ExecutorSettings::default()
        };
        IsolatedExecutor::new(
            Box::new(ShellAdapter),
            root.to_path_buf(),
            settings,
            ShutdownSignal::local(),
        )
        .unwrap()
    }

    fn run(executor: &IsolatedExecutor, source: &str, timeout: Duration) -> ExecutionOutcome {
        executor.execute(
            &Completion::new("task", 0, source),
            SandboxMode::Unsandboxed,
            timeout,
            &ResourceLimits::default(),
        )
    }

    #[test]
    fn test_passing_program() {
        let root = tempfile::tempdir().unwrap();
        let outcome = run(&executor(root.path(), false), "test 2 -eq 2", Duration::from_secs(5));
        assert!(outcome.passed);
        assert!(outcome.compiled);
        assert_eq!(outcome.error_kind, None);
    }

    #[test]
    fn test_failing_program() {
        let root = tempfile::tempdir().unwrap();
        let outcome = run(&executor(root.path(), false), "echo boom >&2; exit 1", Duration::from_secs(5));
        assert!(!outcome.passed);
        assert_eq!(outcome.error_kind, Some(ErrorKind::RuntimeFailure));
        assert!(outcome.detail.unwrap().contains("boom"));
    }

    #[test]
    fn test_timeout_reports_exact_duration() {
        let root = tempfile::tempdir().unwrap();
        let outcome = run(&executor(root.path(), false), "sleep 5", Duration::from_millis(250));
        assert!(outcome.timed_out);
        assert!(!outcome.passed);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(outcome.duration_ms, 250);
    }

    #[test]
    fn test_policy_violation_stops_before_running() {
        let root = tempfile::tempdir().unwrap();
        let marker = root.path().join("ran");
        let source = format!("touch {}; curl http://example.invalid", marker.display());
        let outcome = run(&executor(root.path(), true), &source, Duration::from_secs(5));
        assert!(outcome.policy_violation);
        assert_eq!(outcome.error_kind, Some(ErrorKind::PolicyViolation));
        assert!(!marker.exists());
    }

    #[test]
    fn test_policy_ignored_when_disabled() {
        let root = tempfile::tempdir().unwrap();
        let outcome = run(&executor(root.path(), false), "echo curl is just a word", Duration::from_secs(5));
        assert!(outcome.passed);
        assert!(!outcome.policy_violation);
    }

    #[test]
    fn test_unresolved_mode_never_executes() {
        let root = tempfile::tempdir().unwrap();
        let outcome = executor(root.path(), false).execute(
            &Completion::new("task", 0, "exit 0 # would pass"),
            SandboxMode::Unresolved,
            Duration::from_secs(1),
            &ResourceLimits::default(),
        );
        assert_eq!(outcome.error_kind, Some(ErrorKind::InternalError));
    }

    #[test]
    fn test_problem_harness_is_assembled() {
        let root = tempfile::tempdir().unwrap();
        let problems = ProblemSet::from_problems(vec![Problem {
            task_id: "task".to_string(),
            prompt: "add() {\n".to_string(),
            test: "test \"$(add 2 3)\" = 5\n".to_string(),
        }]);
        let executor = executor(root.path(), false).with_problems(problems);

        assert!(run(&executor, "  echo $(($1 + $2))\n}", Duration::from_secs(5)).passed);
        assert!(!run(&executor, "  echo $(($1 * $2))\n}", Duration::from_secs(5)).passed);
    }

    #[test]
    fn test_rust_program_is_judged_by_main() {
        use crate::judge::languages::rust::RustAdapter;

        let root = tempfile::tempdir().unwrap();
        let executor = IsolatedExecutor::new(
            Box::new(RustAdapter::from_env()),
            root.path().to_path_buf(),
            ExecutorSettings::default(),
            ShutdownSignal::local(),
        )
        .unwrap();

        let failing = run(
            &executor,
            "fn main() { assert_eq!(1 + 1, 3, \"wrong answer\"); }",
            Duration::from_secs(10),
        );
        assert!(failing.compiled);
        assert!(!failing.passed);
        assert_eq!(failing.error_kind, Some(ErrorKind::RuntimeFailure));

        let passing = run(&executor, "fn main() { assert_eq!(1 + 1, 2); }", Duration::from_secs(10));
        assert!(passing.passed, "{:?}", passing);

        let empty_harness = run(
            &executor,
            "#[cfg(any())]\nmod disabled {\n    #[test]\n    fn never() {}\n}\nfn main() {}",
            Duration::from_secs(10),
        );
        assert!(!empty_harness.passed);
        assert_eq!(empty_harness.error_kind, Some(ErrorKind::RuntimeFailure));
    }

    #[test]
    fn test_workspaces_removed_after_execution() {
        let root = tempfile::tempdir().unwrap();
        run(&executor(root.path(), false), "test 1 -eq 1", Duration::from_secs(5));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
