use log::info;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
/// Async-safe run cancellation
/// The handler only stores atomics; workers poll them while waiting on
/// subprocesses and kill their process group when shutdown is requested.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Global shutdown flag (async-safe atomic)
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Global signal received (async-safe atomic)
static SIGNAL_RECEIVED: AtomicU32 = AtomicU32::new(0);

/// Signal handler state
pub struct SignalHandler;

impl SignalHandler {
    /// Install handlers for SIGINT, SIGTERM and SIGHUP.
    /// Must be called early in main() before any worker threads are spawned.
    pub fn init() -> Result<Self, String> {
        let sig_action = SigAction::new(
            SigHandler::Handler(Self::signal_handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        unsafe {
            signal::sigaction(Signal::SIGINT, &sig_action)
                .map_err(|e| format!("Failed to install SIGINT handler: {}", e))?;

            signal::sigaction(Signal::SIGTERM, &sig_action)
                .map_err(|e| format!("Failed to install SIGTERM handler: {}", e))?;

            signal::sigaction(Signal::SIGHUP, &sig_action)
                .map_err(|e| format!("Failed to install SIGHUP handler: {}", e))?;
        }

        info!("Signal handlers installed (SIGINT, SIGTERM, SIGHUP)");
        Ok(Self)
    }

    /// Only performs atomic operations - no allocations, no locks, no I/O
    extern "C" fn signal_handler(signal: libc::c_int) {
        SIGNAL_RECEIVED.store(signal as u32, Ordering::SeqCst);
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
    }

    /// Signal that was received (0 if none)
    pub fn received_signal(&self) -> u32 {
        SIGNAL_RECEIVED.load(Ordering::SeqCst)
    }
}

/// Cancellation handle shared by the pool and every executor.
///
/// A process-wide handle also observes the signal flags; a local handle
/// reacts only to [`ShutdownSignal::trigger`], which keeps tests independent
/// of process state.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    local: Arc<AtomicBool>,
    observe_process: bool,
}

impl ShutdownSignal {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn process_wide() -> Self {
        Self {
            local: Arc::new(AtomicBool::new(false)),
            observe_process: true,
        }
    }

    pub fn trigger(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.local.load(Ordering::SeqCst)
            || (self.observe_process && SHUTDOWN_REQUESTED.load(Ordering::SeqCst))
    }

    /// Signal number behind a process-wide shutdown, if any
    pub fn signal(&self) -> Option<i32> {
        match SIGNAL_RECEIVED.load(Ordering::SeqCst) {
            0 => None,
            sig if self.observe_process => Some(sig as i32),
            _ => None,
        }
    }
}
