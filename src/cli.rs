use crate::aggregate::{AggregateMetrics, MetricsAggregator};
use crate::config::loader::EvalConfig;
use crate::config::types::{
    ErrorKind, FilteredAccounting, JudgeError, PolicyMode, RequestedMode, SandboxMode,
};
use crate::config::validator::validate_config;
use crate::exec::signal::{ShutdownSignal, SignalHandler};
use crate::exec::{ExecutorSettings, IsolatedExecutor};
use crate::judge::adapter_for;
use crate::judge::problem::ProblemSet;
use crate::observability::metrics::get_metrics;
use crate::pool::EvaluationWorkerPool;
use crate::report::metadata::pass_label;
use crate::report::{EvalMetadata, MetricsDocument, ResultWriter, SandboxRecord};
use crate::safety::workspace::WorkspaceManager;
use crate::sandbox::probe::{first_output_line, FirejailProbe, IsolationProbe};
use crate::sandbox::prompt::TerminalPrompt;
use crate::sandbox::{SandboxDecision, SandboxResolver};
use crate::utils::jsonl::CompletionReader;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Scratch directories older than this are leftovers from crashed runs.
const STALE_WORKSPACE_AGE: Duration = Duration::from_secs(3600);

/// Process exit contract
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    Success,
    Failure,
    ConfigError,
    EnvironmentError,
    Partial,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::ConfigError => 2,
            Self::EnvironmentError => 3,
            Self::Partial => 4,
            Self::Interrupted => 130,
        }
    }

    /// Map a top-level error to its exit status by the underlying error class.
    pub fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<JudgeError>() {
            Some(JudgeError::Config(_)) => Self::ConfigError,
            Some(JudgeError::Sandbox(_)) => Self::EnvironmentError,
            Some(JudgeError::Interrupted(_)) => Self::Interrupted,
            _ => Self::Failure,
        }
    }
}

#[derive(Parser)]
#[command(name = "judgebox", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a JSONL file of completions and write results and pass@k metrics
    Evaluate(EvaluateArgs),
    /// Check that the sandbox and the language toolchain are installed
    CheckDeps {
        /// Language adapter to check
        #[arg(long)]
        language: Option<String>,
        /// JSON config file (for the sandbox binary name)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Show version lines
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Completion records, one JSON object per line ("-" reads stdin)
    #[arg(long, short)]
    input: PathBuf,
    /// Problem records {task_id, prompt, test} used to assemble test programs
    #[arg(long)]
    problems: Option<PathBuf>,
    /// Output directory
    #[arg(long, short, default_value = "judgebox-results")]
    out: PathBuf,
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    language: Option<String>,
    /// auto | isolated | none
    #[arg(long)]
    sandbox_mode: Option<RequestedMode>,
    /// Confirmation token required to run without a sandbox
    #[arg(long)]
    confirm_unsandboxed: Option<String>,
    /// Ask on the terminal when the sandbox is unavailable
    #[arg(long)]
    interactive: bool,
    /// Number of worker threads
    #[arg(long, short = 'j')]
    concurrency: Option<usize>,
    /// Per-sample timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    compile_timeout_ms: Option<u64>,
    /// Comma-separated k values, e.g. "1,10,100"
    #[arg(long)]
    k: Option<String>,
    /// off | on | both
    #[arg(long)]
    policy: Option<PolicyMode>,
    /// count-as-failure | exclude
    #[arg(long)]
    filtered_accounting: Option<FilteredAccounting>,
    /// Memory limit per sample in MiB
    #[arg(long)]
    memory_mb: Option<u64>,
}

pub fn run() -> i32 {
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Evaluate(args) => evaluate(args),
        Commands::CheckDeps {
            language,
            config,
            verbose,
        } => check_dependencies(language, config, verbose),
    };

    match outcome {
        Ok(status) => status.code(),
        Err(e) => {
            let status = ExitStatus::from_error(&e);
            eprintln!("Error: {:#}", e);
            status.code()
        }
    }
}

fn build_config(args: &EvaluateArgs) -> Result<EvalConfig> {
    let mut config = match &args.config {
        Some(path) => EvalConfig::load_from_file(path)?,
        None => EvalConfig::default(),
    };

    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    if let Some(mode) = args.sandbox_mode {
        config.sandbox_mode = mode;
    }
    if args.confirm_unsandboxed.is_some() {
        config.confirm_unsandboxed = args.confirm_unsandboxed.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(compile_timeout_ms) = args.compile_timeout_ms {
        config.compile_timeout_ms = compile_timeout_ms;
    }
    if let Some(k) = &args.k {
        config.k_values = EvalConfig::parse_k_values(k)?;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(accounting) = args.filtered_accounting {
        config.filtered_accounting = accounting;
    }
    if let Some(memory_mb) = args.memory_mb {
        config.limits.memory_limit = Some(memory_mb * 1024 * 1024);
    }

    validate_config(&config)?;
    Ok(config)
}

fn resolve_sandbox(config: &EvalConfig, probe: &FirejailProbe, interactive: bool) -> Result<SandboxDecision> {
    let token = config.confirm_unsandboxed.clone();
    let decision = if interactive {
        let mut prompt = TerminalPrompt::new(std::io::stdin().lock(), std::io::stderr());
        SandboxResolver::new(probe)
            .with_confirmation(token)
            .with_prompt(&mut prompt)
            .resolve(config.sandbox_mode, true)
    } else {
        SandboxResolver::new(probe)
            .with_confirmation(token)
            .resolve(config.sandbox_mode, false)
    };

    for message in &decision.messages {
        log::info!("sandbox: {}", message);
    }

    Ok(decision.into_result()?)
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }

    let file = std::fs::File::open(path)
        .map_err(|e| JudgeError::Config(format!("cannot open input {}: {}", path.display(), e)))?;
    Ok(Box::new(BufReader::new(file)))
}

struct PassSummary {
    metrics: AggregateMetrics,
    internal_errors: usize,
    interrupted: bool,
    malformed_lines: usize,
}

fn evaluate(args: EvaluateArgs) -> Result<ExitStatus> {
    let started_at = chrono::Utc::now();
    let config = build_config(&args)?;
    let from_stdin = args.input == Path::new("-");

    if from_stdin && config.policy == PolicyMode::Both {
        return Err(JudgeError::Config(
            "--policy both reads the input twice; pass a file instead of stdin".to_string(),
        )
        .into());
    }
    if from_stdin && args.interactive {
        return Err(JudgeError::Config(
            "--interactive needs stdin for prompts; pass the input as a file".to_string(),
        )
        .into());
    }

    // Inputs are checked before the sandbox is touched, which may install software.
    adapter_for(&config.language)?;
    if !from_stdin {
        open_input(&args.input)?;
    }
    let problems = match &args.problems {
        Some(path) => {
            let problems = ProblemSet::load_jsonl(path)?;
            log::info!("Loaded {} problems from {}", problems.len(), path.display());
            problems
        }
        None => ProblemSet::new(),
    };

    let _signals = SignalHandler::init().map_err(anyhow::Error::msg)?;
    let shutdown = ShutdownSignal::process_wide();

    let probe = FirejailProbe::new(config.firejail_binary.clone(), config.install_command.clone());
    let decision = resolve_sandbox(&config, &probe, args.interactive)?;
    if decision.is_unsandboxed() {
        eprintln!("WARNING: running untrusted completions WITHOUT a sandbox on this host");
    }

    let scratch = WorkspaceManager::new(config.scratch_root.clone())?;
    match scratch.cleanup_old_workspaces(STALE_WORKSPACE_AGE) {
        Ok(0) => {}
        Ok(removed) => log::info!("Removed {} stale scratch directories", removed),
        Err(e) => log::warn!("Stale scratch cleanup failed: {}", e),
    }

    let passes = config.policy.passes();
    let mut passes_run = Vec::new();
    let mut malformed_lines = None;
    let mut status = ExitStatus::Success;

    for &enforce_policy in &passes {
        let out_dir = if passes.len() > 1 {
            args.out.join(pass_label(enforce_policy))
        } else {
            args.out.clone()
        };

        let summary = run_pass(
            &config,
            &args.input,
            &problems,
            &decision,
            enforce_policy,
            &shutdown,
            &out_dir,
        )?;
        passes_run.push(enforce_policy);
        // Every pass reads the same input.
        malformed_lines.get_or_insert(summary.malformed_lines);
        print_summary(pass_label(enforce_policy), &summary.metrics);

        if summary.internal_errors > 0 {
            log::warn!(
                "{} samples failed for infrastructure reasons",
                summary.internal_errors
            );
            status = ExitStatus::Partial;
        }
        if summary.interrupted {
            status = ExitStatus::Interrupted;
            break;
        }
    }

    let sandbox_version = (decision.mode == SandboxMode::Isolated)
        .then(|| probe.version())
        .flatten();
    let adapter = adapter_for(&config.language)?;
    let metadata = EvalMetadata::collect(
        &config,
        adapter.as_ref(),
        sandbox_version,
        &passes_run,
        malformed_lines.unwrap_or(0),
        started_at,
    )?;
    std::fs::create_dir_all(&args.out)?;
    metadata
        .write(&args.out)
        .with_context(|| format!("writing metadata to {}", args.out.display()))?;

    if status == ExitStatus::Interrupted {
        eprintln!(
            "Interrupted (signal {}); partial results written to {}",
            shutdown.signal().unwrap_or(libc::SIGINT),
            args.out.display()
        );
    }
    Ok(status)
}

fn run_pass(
    config: &EvalConfig,
    input: &Path,
    problems: &ProblemSet,
    decision: &SandboxDecision,
    enforce_policy: bool,
    shutdown: &ShutdownSignal,
    out_dir: &Path,
) -> Result<PassSummary> {
    log::info!(
        "Starting {} pass: language={} concurrency={} timeout={}ms mode={}",
        pass_label(enforce_policy),
        config.language,
        config.concurrency,
        config.timeout_ms,
        decision.mode
    );

    let settings = ExecutorSettings {
        compile_timeout: config.compile_timeout(),
        kill_grace: config.kill_grace(),
        enforce_policy,
        firejail_binary: config.firejail_binary.clone(),
        extra_toolchain_dirs: config.toolchain_dirs.clone(),
    };
    let executor = IsolatedExecutor::new(
        adapter_for(&config.language)?,
        config.scratch_root.clone(),
        settings,
        shutdown.clone(),
    )?
    .with_problems(problems.clone());

    let registry = get_metrics();
    registry.reset();
    let pool = EvaluationWorkerPool::new(Arc::new(executor), config.limits.clone())
        .with_shutdown(shutdown.clone())
        .with_registry(Arc::clone(&registry));

    let reader = CompletionReader::new(open_input(input)?);
    let malformed = reader.malformed_counter();
    let report = pool.run_all(reader, config.concurrency, config.timeout(), decision.mode)?;
    log::info!("Pass counters: {}", registry.summary());

    let metrics = MetricsAggregator::new(config.filtered_accounting)
        .with_sandbox(decision.mode)
        .aggregate(&report.outcomes, &config.k_values);

    let writer = ResultWriter::new(out_dir)?;
    writer
        .write_results(&report.outcomes)
        .with_context(|| format!("writing results to {}", out_dir.display()))?;
    let mut effective = config.clone();
    effective.policy = if enforce_policy { PolicyMode::On } else { PolicyMode::Off };
    writer.write_metrics(&MetricsDocument::new(
        metrics.clone(),
        effective,
        SandboxRecord::from(decision),
    ))?;

    let internal_errors = report
        .outcomes
        .iter()
        .filter(|o| o.error_kind == Some(ErrorKind::InternalError))
        .count();

    Ok(PassSummary {
        metrics,
        internal_errors,
        interrupted: report.interrupted,
        malformed_lines: malformed.load(Ordering::Relaxed),
    })
}

fn print_summary(label: &str, metrics: &AggregateMetrics) {
    println!(
        "[{}] {} samples ({} evaluated, {} filtered)",
        label, metrics.total_samples, metrics.evaluated_samples, metrics.filtered_samples
    );
    for (k, value) in &metrics.pass_at_k {
        println!("  pass@{:<4} {:.4}", k, value);
    }
    if !metrics.skipped_k.is_empty() {
        println!("  skipped k: {:?} (fewer samples per task)", metrics.skipped_k);
    }
    println!(
        "  compile_rate {:.4}  policy_clean_rate {:.4}  timeout_rate {:.4}",
        metrics.compile_rate, metrics.policy_clean_rate, metrics.timeout_rate
    );
    if metrics.unsandboxed {
        println!("  UNSANDBOXED run");
    }
}

fn check_dependencies(language: Option<String>, config: Option<PathBuf>, verbose: bool) -> Result<ExitStatus> {
    let config = match config {
        Some(path) => EvalConfig::load_from_file(path)?,
        None => EvalConfig::default(),
    };
    let language = language.unwrap_or_else(|| config.language.clone());
    let adapter = adapter_for(&language)?;

    println!("Checking dependencies...");
    println!();

    let probe = FirejailProbe::new(config.firejail_binary.clone(), config.install_command.clone());
    let sandbox_ok = probe.is_available();
    report_dependency("Firejail", sandbox_ok, probe.version(), verbose);

    let toolchain = first_output_line(&adapter.version_command());
    let toolchain_ok = toolchain.is_some();
    report_dependency(adapter.language(), toolchain_ok, toolchain, verbose);

    println!();
    if sandbox_ok && toolchain_ok {
        println!("✅ judgebox is ready to evaluate {} completions", adapter.language());
        return Ok(ExitStatus::Success);
    }

    if !sandbox_ok {
        println!("🔧 Install Firejail: {}", config.install_command.join(" "));
    }
    if !toolchain_ok {
        println!(
            "🔧 `{}` failed; install the {} toolchain",
            adapter.version_command().join(" "),
            adapter.language()
        );
    }
    Ok(ExitStatus::EnvironmentError)
}

fn report_dependency(name: &str, ok: bool, version: Option<String>, verbose: bool) {
    if ok {
        println!("✅ {} - OK", name);
    } else {
        println!("❌ {} - MISSING", name);
    }
    if verbose {
        if let Some(version) = version {
            println!("  {}", version);
        }
    }
}
