/// Subprocess stage runner
/// Spawns one stage in its own process group, enforces the wall-clock limit
/// by polling, and tears the whole group down on timeout or cancellation.
use crate::config::types::{JudgeError, ResourceLimits, Result};
use crate::exec::signal::ShutdownSignal;
use crate::utils::output::{CapturedOutput, StreamCapture};
use serde::{Deserialize, Serialize};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// One compile or run invocation
#[derive(Clone, Debug)]
pub struct StageCommand {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub environment: Vec<(String, String)>,
    pub timeout: Duration,
    pub limits: ResourceLimits,
    /// Apply rlimits in the child before exec (direct launches only)
    pub apply_rlimits: bool,
}

/// Signal escalation report for timeout/forced termination paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub struct StageReport {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Equals the stage timeout exactly when the stage was killed for it
    pub duration: Duration,
    pub stdout: CapturedOutput,
    pub stderr: CapturedOutput,
    pub kill_report: Option<KillReport>,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

#[derive(Clone, Debug)]
pub struct ProcessRunner {
    kill_grace: Duration,
    poll_interval: Duration,
    collection_timeout: Duration,
    shutdown: ShutdownSignal,
}

impl ProcessRunner {
    pub fn new(kill_grace: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            kill_grace,
            poll_interval: Duration::from_millis(10),
            collection_timeout: Duration::from_secs(2),
            shutdown,
        }
    }

    pub fn run(&self, stage: &StageCommand) -> Result<StageReport> {
        let (program, args) = stage
            .argv
            .split_first()
            .ok_or_else(|| JudgeError::Process("empty command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&stage.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .process_group(0);

        for (key, value) in base_environment(stage) {
            cmd.env(key, value);
        }
        for (key, value) in &stage.environment {
            cmd.env(key, value);
        }

        if stage.apply_rlimits {
            let limits = RlimitSet::from_stage(stage);
            // SAFETY: the hook only calls setrlimit, which is async-signal-safe.
            unsafe {
                cmd.pre_exec(move || limits.apply());
            }
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| JudgeError::Process(format!("spawn {}: {}", program, e)))?;

        let output_limit = stage.limits.output_limit;
        let stdout = StreamCapture::spawn(child.stdout.take(), output_limit);
        let stderr = StreamCapture::spawn(child.stderr.take(), output_limit);

        let mut timed_out = false;
        let mut cancelled = false;
        let mut kill_report = None;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() >= stage.timeout {
                        timed_out = true;
                    } else if self.shutdown.is_triggered() {
                        cancelled = true;
                    }

                    if timed_out || cancelled {
                        let (status, report) = self.terminate_group(&mut child)?;
                        kill_report = Some(report);
                        break status;
                    }

                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    let _ = self.terminate_group(&mut child);
                    return Err(JudgeError::Process(format!("wait {}: {}", program, e)));
                }
            }
        };

        let duration = if timed_out {
            stage.timeout
        } else {
            started.elapsed()
        };

        if let Some(report) = &kill_report {
            log::debug!(
                "Terminated process group of '{}' (timed_out={}, cancelled={}, {:?})",
                program,
                timed_out,
                cancelled,
                report
            );
        }

        Ok(StageReport {
            exit_code: status.code(),
            signal: status.signal(),
            timed_out,
            cancelled,
            duration,
            stdout: stdout.finish(self.collection_timeout),
            stderr: stderr.finish(self.collection_timeout),
            kill_report,
        })
    }

    /// SIGTERM the group, give it the grace period, then SIGKILL whatever is left.
    fn terminate_group(&self, child: &mut Child) -> Result<(ExitStatus, KillReport)> {
        let mut report = KillReport::default();
        let start = Instant::now();
        let pgid = child.id() as libc::pid_t;

        let term_rc = unsafe { libc::kill(-pgid, libc::SIGTERM) };
        if term_rc != 0 {
            let _ = unsafe { libc::kill(pgid, libc::SIGTERM) };
            report.notes.push(format!(
                "group SIGTERM fallback used: {}",
                std::io::Error::last_os_error()
            ));
        }
        report.term_sent = true;

        while start.elapsed() < self.kill_grace {
            if matches!(child.try_wait(), Ok(Some(_))) {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        // Descendants may outlive the group leader, so the group is killed regardless.
        let kill_rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if kill_rc == 0 {
            report.kill_sent = true;
        } else if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
            report.kill_sent = true;
            report.notes.push(format!(
                "group SIGKILL fallback used: {}",
                std::io::Error::last_os_error()
            ));
        }

        let status = child
            .wait()
            .map_err(|e| JudgeError::Process(format!("reap after kill: {}", e)))?;
        report.waited_ms = start.elapsed().as_millis() as u64;
        Ok((status, report))
    }
}

fn base_environment(stage: &StageCommand) -> Vec<(String, String)> {
    let path = std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());
    let workdir = stage.workdir.to_string_lossy().to_string();
    vec![
        ("PATH".to_string(), path),
        ("HOME".to_string(), workdir.clone()),
        ("TMPDIR".to_string(), workdir),
        ("LANG".to_string(), "C.UTF-8".to_string()),
    ]
}

/// Plain-data copy of the limits so the pre-exec hook does not allocate.
#[derive(Clone, Copy, Debug)]
struct RlimitSet {
    address_space: Option<u64>,
    file_size: Option<u64>,
    cpu_seconds: u64,
}

impl RlimitSet {
    fn from_stage(stage: &StageCommand) -> Self {
        Self {
            address_space: stage.limits.memory_limit,
            file_size: stage.limits.file_size_limit,
            cpu_seconds: ResourceLimits::cpu_seconds_for(stage.timeout),
        }
    }

    fn apply(&self) -> std::io::Result<()> {
        set_rlimit(libc::RLIMIT_CORE, 0)?;
        set_rlimit(libc::RLIMIT_CPU, self.cpu_seconds)?;
        if let Some(bytes) = self.address_space {
            set_rlimit(libc::RLIMIT_AS, bytes)?;
        }
        if let Some(bytes) = self.file_size {
            set_rlimit(libc::RLIMIT_FSIZE, bytes)?;
        }
        Ok(())
    }
}

fn set_rlimit(resource: libc::__rlimit_resource_t, value: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
