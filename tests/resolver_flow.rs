//! Integration tests for sandbox resolution
//!
//! Drive the resolver through the terminal prompt with scripted stdin and a
//! probe whose availability the test controls.

use judgebox::config::types::CONFIRMATION_TOKEN;
use judgebox::sandbox::probe::IsolationProbe;
use judgebox::sandbox::prompt::TerminalPrompt;
use judgebox::{
    JudgeError, RequestedMode, SandboxDecision, SandboxDecisionStatus, SandboxMode, SandboxResolver,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct ScriptedProbe {
    available: AtomicBool,
    /// Becomes available after this many probes (0 = never)
    available_after: usize,
    probes: AtomicUsize,
    installs: AtomicUsize,
    install_works: bool,
}

impl ScriptedProbe {
    fn missing() -> Self {
        Self {
            available: AtomicBool::new(false),
            available_after: 0,
            probes: AtomicUsize::new(0),
            installs: AtomicUsize::new(0),
            install_works: false,
        }
    }

    fn present() -> Self {
        let probe = Self::missing();
        probe.available.store(true, Ordering::SeqCst);
        probe
    }
}

impl IsolationProbe for ScriptedProbe {
    fn name(&self) -> &str {
        "firejail"
    }

    fn is_available(&self) -> bool {
        let count = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.available_after > 0 && count >= self.available_after {
            self.available.store(true, Ordering::SeqCst);
        }
        self.available.load(Ordering::SeqCst)
    }

    fn install(&self) -> judgebox::Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.install_works {
            self.available.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(JudgeError::Sandbox("apt-get exited with 100".to_string()))
        }
    }
}

fn resolve_interactive(probe: &ScriptedProbe, requested: RequestedMode, stdin: &str) -> SandboxDecision {
    let mut prompt = TerminalPrompt::new(Cursor::new(stdin.to_string()), Vec::new());
    SandboxResolver::new(probe)
        .with_prompt(&mut prompt)
        .resolve(requested, true)
}

#[test]
fn test_available_firejail_resolves_isolated() {
    let probe = ScriptedProbe::present();
    let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Auto, false);
    assert_eq!(decision.mode, SandboxMode::Isolated);
    assert_eq!(decision.status, SandboxDecisionStatus::Ready);
    assert!(!decision.is_unsandboxed());
}

#[test]
fn test_non_interactive_install_failure_is_fatal_with_remediation() {
    let probe = ScriptedProbe::missing();
    let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Auto, false);

    assert_eq!(decision.mode, SandboxMode::Unresolved);
    assert_eq!(decision.status, SandboxDecisionStatus::InstallFailed);
    assert_eq!(probe.installs.load(Ordering::SeqCst), 1);

    let error = decision.into_result().unwrap_err().to_string();
    assert!(error.contains("install"));
    assert!(error.contains(CONFIRMATION_TOKEN));
}

#[test]
fn test_non_interactive_install_success() {
    let mut probe = ScriptedProbe::missing();
    probe.install_works = true;
    let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Isolated, false);
    assert_eq!(decision.mode, SandboxMode::Isolated);
    assert_eq!(decision.status, SandboxDecisionStatus::Ready);
}

#[test]
fn test_explicit_none_needs_token_non_interactively() {
    let probe = ScriptedProbe::present();

    let declined = SandboxResolver::new(&probe).resolve(RequestedMode::Unsandboxed, false);
    assert_eq!(declined.status, SandboxDecisionStatus::UserDeclined);
    assert!(declined.is_fatal());

    let wrong = SandboxResolver::new(&probe)
        .with_confirmation(Some("i understand the risks".to_string()))
        .resolve(RequestedMode::Unsandboxed, false);
    assert_eq!(wrong.status, SandboxDecisionStatus::UserDeclined);

    let accepted = SandboxResolver::new(&probe)
        .with_confirmation(Some(CONFIRMATION_TOKEN.to_string()))
        .resolve(RequestedMode::Unsandboxed, false);
    assert_eq!(accepted.mode, SandboxMode::Unsandboxed);
    assert_eq!(accepted.status, SandboxDecisionStatus::Unsandboxed);
    // The probe is never consulted for an explicit, confirmed opt-out.
    assert_eq!(probe.probes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_interactive_proceed_requires_literal_token() {
    let probe = ScriptedProbe::missing();
    let stdin = format!("u\n{}\n", CONFIRMATION_TOKEN);
    let decision = resolve_interactive(&probe, RequestedMode::Auto, &stdin);

    assert_eq!(decision.mode, SandboxMode::Unsandboxed);
    assert_eq!(decision.status, SandboxDecisionStatus::Unsandboxed);
    // Interactive runs never self-install.
    assert_eq!(probe.installs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_interactive_wrong_token_returns_to_menu() {
    let probe = ScriptedProbe::missing();
    let decision = resolve_interactive(&probe, RequestedMode::Auto, "u\nyes\na\n");
    assert_eq!(decision.mode, SandboxMode::Unresolved);
    assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);
    assert!(decision
        .messages
        .iter()
        .any(|m| m.contains("did not match")));
}

#[test]
fn test_interactive_retry_until_available() {
    let mut probe = ScriptedProbe::missing();
    probe.available_after = 3;
    let decision = resolve_interactive(&probe, RequestedMode::Auto, "r\nr\n");
    assert_eq!(decision.mode, SandboxMode::Isolated);
    assert_eq!(decision.status, SandboxDecisionStatus::Ready);
    assert_eq!(probe.probes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_interactive_eof_aborts() {
    let probe = ScriptedProbe::missing();
    let decision = resolve_interactive(&probe, RequestedMode::Auto, "");
    assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);
    assert!(decision.into_result().is_err());
}

#[test]
fn test_interactive_explicit_none_prompts_for_token() {
    let probe = ScriptedProbe::present();
    let stdin = format!("{}\n", CONFIRMATION_TOKEN);
    let decision = resolve_interactive(&probe, RequestedMode::Unsandboxed, &stdin);
    assert_eq!(decision.mode, SandboxMode::Unsandboxed);

    let declined = resolve_interactive(&probe, RequestedMode::Unsandboxed, "nope\n");
    assert_eq!(declined.status, SandboxDecisionStatus::UserDeclined);
}
