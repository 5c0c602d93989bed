/// Sandbox mode resolution
/// An explicit state machine: `step` is the transition function and
/// `resolve` drives it until a terminal state. Interactive choices are
/// consumed in that loop, never by recursion.
use crate::config::types::{
    JudgeError, RequestedMode, Result, SandboxDecisionStatus, SandboxMode, CONFIRMATION_TOKEN,
};
use crate::sandbox::probe::IsolationProbe;
use crate::sandbox::prompt::{DecisionPrompt, FallbackChoice};

const DEFAULT_MAX_RETRIES: u32 = 5;

/// Final, immutable result of resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxDecision {
    pub mode: SandboxMode,
    pub status: SandboxDecisionStatus,
    /// Human-readable trail of how the decision was reached
    pub messages: Vec<String>,
}

impl SandboxDecision {
    pub fn is_fatal(&self) -> bool {
        self.status.is_fatal()
    }

    pub fn is_unsandboxed(&self) -> bool {
        self.mode == SandboxMode::Unsandboxed
    }

    pub fn remediation(&self) -> Option<String> {
        self.is_fatal().then(|| {
            format!(
                "install Firejail (e.g. `apt-get install firejail`), or rerun with \
                 `--sandbox-mode none --confirm-unsandboxed \"{}\"` to accept running untrusted code on this host",
                CONFIRMATION_TOKEN
            )
        })
    }

    /// Turn a fatal decision into a `JudgeError::Sandbox` carrying the remediation.
    pub fn into_result(self) -> Result<Self> {
        if !self.is_fatal() {
            return Ok(self);
        }

        let mut message = format!("sandbox resolution failed ({})", self.status);
        if let Some(last) = self.messages.last() {
            message.push_str(&format!(": {}", last));
        }
        if let Some(remediation) = self.remediation() {
            message.push_str(&format!("\nremediation: {}", remediation));
        }
        Err(JudgeError::Sandbox(message))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResolverState {
    Start,
    Probe,
    Install,
    AskFallback,
    /// `explicit` is true when the operator asked for `none` up front
    AwaitConfirmation { explicit: bool },
    Done(SandboxMode, SandboxDecisionStatus),
}

pub struct SandboxResolver<'a> {
    probe: &'a dyn IsolationProbe,
    prompt: Option<&'a mut dyn DecisionPrompt>,
    confirmation: Option<String>,
    max_retries: u32,
}

impl<'a> SandboxResolver<'a> {
    pub fn new(probe: &'a dyn IsolationProbe) -> Self {
        Self {
            probe,
            prompt: None,
            confirmation: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_prompt(mut self, prompt: &'a mut dyn DecisionPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Token supplied up front (CLI flag or config) for non-interactive runs
    pub fn with_confirmation(mut self, token: Option<String>) -> Self {
        self.confirmation = token;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn resolve(&mut self, requested: RequestedMode, interactive: bool) -> SandboxDecision {
        let interactive = interactive && self.prompt.is_some();
        let mut messages = Vec::new();
        let mut retries = 0u32;
        let mut state = ResolverState::Start;

        loop {
            state = match state {
                ResolverState::Done(mode, status) => {
                    log::info!("Sandbox resolved: mode={} status={}", mode, status);
                    return SandboxDecision {
                        mode,
                        status,
                        messages,
                    };
                }
                ResolverState::AskFallback => {
                    let choice = self.ask_fallback();
                    if choice == FallbackChoice::Retry {
                        retries += 1;
                    }
                    Self::after_choice(choice, retries, self.max_retries, &mut messages)
                }
                other => self.step(other, requested, interactive, &mut messages),
            };
        }
    }

    /// Transition function for every state that does not need operator input.
    fn step(
        &mut self,
        state: ResolverState,
        requested: RequestedMode,
        interactive: bool,
        messages: &mut Vec<String>,
    ) -> ResolverState {
        match state {
            ResolverState::Start => {
                if requested != RequestedMode::Unsandboxed {
                    return ResolverState::Probe;
                }
                if self.confirmation.as_deref() == Some(CONFIRMATION_TOKEN) {
                    messages.push("unsandboxed execution confirmed by token".to_string());
                    return ResolverState::Done(
                        SandboxMode::Unsandboxed,
                        SandboxDecisionStatus::Unsandboxed,
                    );
                }
                if interactive {
                    return ResolverState::AwaitConfirmation { explicit: true };
                }
                messages.push(
                    "unsandboxed execution requested without the confirmation token".to_string(),
                );
                ResolverState::Done(SandboxMode::Unresolved, SandboxDecisionStatus::UserDeclined)
            }
            ResolverState::Probe => {
                if self.probe.is_available() {
                    messages.push(format!("{} is available", self.probe.name()));
                    return ResolverState::Done(SandboxMode::Isolated, SandboxDecisionStatus::Ready);
                }
                messages.push(format!("{} not found or not functional", self.probe.name()));
                log::warn!("{} not found or not functional", self.probe.name());
                if interactive {
                    ResolverState::AskFallback
                } else {
                    ResolverState::Install
                }
            }
            ResolverState::Install => match self.probe.install() {
                Ok(()) if self.probe.is_available() => {
                    messages.push(format!("installed {}", self.probe.name()));
                    ResolverState::Done(SandboxMode::Isolated, SandboxDecisionStatus::Ready)
                }
                Ok(()) => {
                    messages.push(format!(
                        "install reported success but {} is still unavailable",
                        self.probe.name()
                    ));
                    ResolverState::Done(SandboxMode::Unresolved, SandboxDecisionStatus::InstallFailed)
                }
                Err(e) => {
                    messages.push(format!("install failed: {}", e));
                    ResolverState::Done(SandboxMode::Unresolved, SandboxDecisionStatus::InstallFailed)
                }
            },
            ResolverState::AwaitConfirmation { explicit } => {
                let typed = self.prompt.as_mut().and_then(|p| p.confirm_unsandboxed());
                if typed.as_deref() == Some(CONFIRMATION_TOKEN) {
                    messages.push("unsandboxed execution confirmed interactively".to_string());
                    return ResolverState::Done(
                        SandboxMode::Unsandboxed,
                        SandboxDecisionStatus::Unsandboxed,
                    );
                }

                messages.push("confirmation text did not match".to_string());
                match typed {
                    Some(_) if !explicit => ResolverState::AskFallback,
                    _ => ResolverState::Done(
                        SandboxMode::Unresolved,
                        SandboxDecisionStatus::UserDeclined,
                    ),
                }
            }
            // Handled by the driving loop.
            ResolverState::AskFallback | ResolverState::Done(..) => state,
        }
    }

    fn ask_fallback(&mut self) -> FallbackChoice {
        let reason = format!("{} is not installed or not functional", self.probe.name());
        match self.prompt.as_mut() {
            Some(prompt) => prompt.choose_fallback(&reason),
            None => FallbackChoice::Abort,
        }
    }

    fn after_choice(
        choice: FallbackChoice,
        retries: u32,
        max_retries: u32,
        messages: &mut Vec<String>,
    ) -> ResolverState {
        match choice {
            FallbackChoice::Retry if retries > max_retries => {
                messages.push(format!("gave up after {} retries", max_retries));
                ResolverState::Done(SandboxMode::Unresolved, SandboxDecisionStatus::UserDeclined)
            }
            FallbackChoice::Retry => ResolverState::Probe,
            FallbackChoice::ProceedUnsandboxed => ResolverState::AwaitConfirmation { explicit: false },
            FallbackChoice::Abort => {
                messages.push("operator aborted".to_string());
                ResolverState::Done(SandboxMode::Unresolved, SandboxDecisionStatus::UserDeclined)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeProbe {
        available: AtomicBool,
        install_succeeds: bool,
        installs: AtomicUsize,
    }

    impl FakeProbe {
        fn new(available: bool, install_succeeds: bool) -> Self {
            Self {
                available: AtomicBool::new(available),
                install_succeeds,
                installs: AtomicUsize::new(0),
            }
        }
    }

    impl IsolationProbe for FakeProbe {
        fn name(&self) -> &str {
            "fakejail"
        }

        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn install(&self) -> Result<()> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.install_succeeds {
                self.available.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(JudgeError::Sandbox("no package manager".to_string()))
            }
        }
    }

    struct ScriptedPrompt {
        choices: VecDeque<FallbackChoice>,
        confirmations: VecDeque<String>,
        asked: Cell<usize>,
    }

    impl ScriptedPrompt {
        fn new(choices: &[FallbackChoice], confirmations: &[&str]) -> Self {
            Self {
                choices: choices.iter().copied().collect(),
                confirmations: confirmations.iter().map(|s| s.to_string()).collect(),
                asked: Cell::new(0),
            }
        }
    }

    impl DecisionPrompt for ScriptedPrompt {
        fn choose_fallback(&mut self, _reason: &str) -> FallbackChoice {
            self.asked.set(self.asked.get() + 1);
            self.choices.pop_front().unwrap_or(FallbackChoice::Abort)
        }

        fn confirm_unsandboxed(&mut self) -> Option<String> {
            self.confirmations.pop_front()
        }
    }

    #[test]
    fn test_available_primitive_is_ready() {
        let probe = FakeProbe::new(true, false);
        let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Auto, false);
        assert_eq!(decision.mode, SandboxMode::Isolated);
        assert_eq!(decision.status, SandboxDecisionStatus::Ready);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_interactive_installs_once() {
        let probe = FakeProbe::new(false, true);
        let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Isolated, false);
        assert_eq!(decision.status, SandboxDecisionStatus::Ready);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_interactive_install_failure_is_fatal() {
        let probe = FakeProbe::new(false, false);
        let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Auto, false);
        assert_eq!(decision.mode, SandboxMode::Unresolved);
        assert_eq!(decision.status, SandboxDecisionStatus::InstallFailed);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 1);
        assert!(decision.remediation().is_some());
        assert!(matches!(decision.into_result(), Err(JudgeError::Sandbox(_))));
    }

    #[test]
    fn test_explicit_none_requires_token_non_interactively() {
        let probe = FakeProbe::new(true, true);
        let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Unsandboxed, false);
        assert_eq!(decision.mode, SandboxMode::Unresolved);
        assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);

        let decision = SandboxResolver::new(&probe)
            .with_confirmation(Some("i understand the risks".to_string()))
            .resolve(RequestedMode::Unsandboxed, false);
        assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);

        let decision = SandboxResolver::new(&probe)
            .with_confirmation(Some(CONFIRMATION_TOKEN.to_string()))
            .resolve(RequestedMode::Unsandboxed, false);
        assert_eq!(decision.mode, SandboxMode::Unsandboxed);
        assert_eq!(decision.status, SandboxDecisionStatus::Unsandboxed);
    }

    #[test]
    fn test_interactive_fallback_requires_literal_token() {
        let probe = FakeProbe::new(false, true);
        let mut prompt = ScriptedPrompt::new(
            &[FallbackChoice::ProceedUnsandboxed, FallbackChoice::ProceedUnsandboxed],
            &["yes", CONFIRMATION_TOKEN],
        );
        let decision = SandboxResolver::new(&probe)
            .with_prompt(&mut prompt)
            .resolve(RequestedMode::Auto, true);

        assert_eq!(decision.mode, SandboxMode::Unsandboxed);
        assert_eq!(decision.status, SandboxDecisionStatus::Unsandboxed);
        assert_eq!(prompt.asked.get(), 2);
        // Interactive runs never self-install.
        assert_eq!(probe.installs.load(Ordering::SeqCst), 0);
    }

    /// Operator who installs the tool while the menu is open, then retries.
    struct InstallingOperator<'a> {
        probe: &'a FakeProbe,
        asked: usize,
    }

    impl DecisionPrompt for InstallingOperator<'_> {
        fn choose_fallback(&mut self, _reason: &str) -> FallbackChoice {
            self.asked += 1;
            self.probe.available.store(true, Ordering::SeqCst);
            FallbackChoice::Retry
        }

        fn confirm_unsandboxed(&mut self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_interactive_retry_then_ready() {
        let probe = FakeProbe::new(false, false);
        let mut operator = InstallingOperator { probe: &probe, asked: 0 };
        let decision = SandboxResolver::new(&probe)
            .with_prompt(&mut operator)
            .resolve(RequestedMode::Auto, true);

        assert_eq!(decision.mode, SandboxMode::Isolated);
        assert_eq!(decision.status, SandboxDecisionStatus::Ready);
        assert_eq!(operator.asked, 1);
        assert_eq!(probe.installs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_interactive_abort() {
        let probe = FakeProbe::new(false, false);
        let mut prompt = ScriptedPrompt::new(&[FallbackChoice::Abort], &[]);
        let decision = SandboxResolver::new(&probe)
            .with_prompt(&mut prompt)
            .resolve(RequestedMode::Auto, true);
        assert_eq!(decision.mode, SandboxMode::Unresolved);
        assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);
    }

    #[test]
    fn test_retry_limit() {
        let probe = FakeProbe::new(false, false);
        let mut prompt = ScriptedPrompt::new(&[FallbackChoice::Retry; 10], &[]);
        let decision = SandboxResolver::new(&probe)
            .with_prompt(&mut prompt)
            .with_max_retries(2)
            .resolve(RequestedMode::Auto, true);
        assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);
        assert_eq!(prompt.asked.get(), 3);
    }

    #[test]
    fn test_explicit_none_interactive_mismatch_declines() {
        let probe = FakeProbe::new(true, false);
        let mut prompt = ScriptedPrompt::new(&[], &["nope"]);
        let decision = SandboxResolver::new(&probe)
            .with_prompt(&mut prompt)
            .resolve(RequestedMode::Unsandboxed, true);
        assert_eq!(decision.status, SandboxDecisionStatus::UserDeclined);
    }

    #[test]
    fn test_interactive_without_prompt_behaves_non_interactively() {
        let probe = FakeProbe::new(false, false);
        let decision = SandboxResolver::new(&probe).resolve(RequestedMode::Auto, true);
        assert_eq!(decision.status, SandboxDecisionStatus::InstallFailed);
    }
}
