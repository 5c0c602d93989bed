/// Verdict classification
/// Pure functions over stage reports. Judge actions (timeout kill,
/// cancellation) take precedence over the exit status, because a forced kill
/// also surfaces as a signal or non-zero exit.
use crate::config::types::ErrorKind;
use crate::exec::process::StageReport;
use std::time::Duration;

const DIAGNOSTIC_LINES: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub compiled: bool,
    pub timed_out: bool,
    pub error_kind: Option<ErrorKind>,
    pub duration: Duration,
    pub detail: Option<String>,
}

impl Verdict {
    fn failure(compiled: bool, error_kind: ErrorKind, duration: Duration) -> Self {
        Self {
            passed: false,
            compiled,
            timed_out: false,
            error_kind: Some(error_kind),
            duration,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.is_empty() {
            self.detail = Some(detail);
        }
        self
    }
}

pub struct VerdictClassifier;

impl VerdictClassifier {
    /// `None` means compilation succeeded and the run stage should follow.
    pub fn classify_compile(report: &StageReport) -> Option<Verdict> {
        if report.cancelled {
            return Some(Verdict::failure(false, ErrorKind::Cancelled, report.duration));
        }

        if report.timed_out {
            return Some(
                Verdict::failure(false, ErrorKind::CompileError, report.duration)
                    .with_detail("compilation timed out"),
            );
        }

        if report.exit_code == Some(0) {
            return None;
        }

        Some(
            Verdict::failure(false, ErrorKind::CompileError, report.duration)
                .with_detail(report.stderr.head(DIAGNOSTIC_LINES)),
        )
    }

    pub fn classify_run(report: &StageReport, compiled: bool) -> Verdict {
        if report.cancelled {
            return Verdict::failure(compiled, ErrorKind::Cancelled, report.duration);
        }

        if report.timed_out {
            let mut verdict = Verdict::failure(compiled, ErrorKind::Timeout, report.duration);
            verdict.timed_out = true;
            return verdict;
        }

        if let Some(code) = report.exit_code {
            if code == 0 {
                return Verdict {
                    passed: true,
                    compiled,
                    timed_out: false,
                    error_kind: None,
                    duration: report.duration,
                    detail: None,
                };
            }

            return Verdict::failure(compiled, ErrorKind::RuntimeFailure, report.duration)
                .with_detail(Self::failure_detail(&format!("exit code {}", code), report));
        }

        if let Some(signal) = report.signal {
            // CPU rlimit exhaustion is a timeout enforced by the kernel.
            if signal == libc::SIGXCPU {
                let mut verdict = Verdict::failure(compiled, ErrorKind::Timeout, report.duration)
                    .with_detail("cpu time limit exceeded");
                verdict.timed_out = true;
                return verdict;
            }

            return Verdict::failure(compiled, ErrorKind::RuntimeFailure, report.duration)
                .with_detail(Self::failure_detail(&format!("killed by signal {}", signal), report));
        }

        Verdict::failure(compiled, ErrorKind::InternalError, report.duration)
            .with_detail("unexpected termination state")
    }

    /// Clean exit that exercised nothing, such as a test harness with no tests.
    pub fn vacuous(duration: Duration, reason: &str) -> Verdict {
        Verdict::failure(true, ErrorKind::RuntimeFailure, duration).with_detail(reason)
    }

    fn failure_detail(summary: &str, report: &StageReport) -> String {
        let stderr = report.stderr.head(DIAGNOSTIC_LINES);
        if stderr.is_empty() {
            summary.to_string()
        } else {
            format!("{}\n{}", summary, stderr)
        }
    }
}
