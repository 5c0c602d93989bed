/// Bounded worker pool
/// A producer on the calling thread feeds a bounded queue (capacity
/// N x multiplier) that N long-lived worker threads drain. Every completion
/// taken from the input yields exactly one outcome, including under
/// cancellation and worker panics.
use crate::config::types::{
    Completion, ExecutionOutcome, JudgeError, ResourceLimits, Result, SandboxMode,
};
use crate::exec::executor::SampleExecutor;
use crate::exec::signal::ShutdownSignal;
use crate::judge::filter::SampleFilter;
use crate::observability::metrics::MetricsRegistry;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_QUEUE_MULTIPLIER: usize = 2;
const PRODUCER_POLL: Duration = Duration::from_millis(100);
const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug)]
pub struct PoolReport {
    /// One per submitted completion, in completion order (unspecified)
    pub outcomes: Vec<ExecutionOutcome>,
    pub submitted: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

pub struct EvaluationWorkerPool {
    executor: Arc<dyn SampleExecutor>,
    filter: SampleFilter,
    limits: ResourceLimits,
    queue_multiplier: usize,
    shutdown: ShutdownSignal,
    registry: Arc<MetricsRegistry>,
}

impl EvaluationWorkerPool {
    pub fn new(executor: Arc<dyn SampleExecutor>, limits: ResourceLimits) -> Self {
        Self {
            executor,
            filter: SampleFilter::default(),
            limits,
            queue_multiplier: DEFAULT_QUEUE_MULTIPLIER,
            shutdown: ShutdownSignal::local(),
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_filter(mut self, filter: SampleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_queue_multiplier(mut self, multiplier: usize) -> Self {
        self.queue_multiplier = multiplier.max(1);
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_registry(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Evaluate a possibly unbounded stream of completions.
    pub fn run_all<I>(
        &self,
        completions: I,
        concurrency: usize,
        timeout: Duration,
        mode: SandboxMode,
    ) -> Result<PoolReport>
    where
        I: IntoIterator<Item = Completion>,
    {
        if concurrency == 0 {
            return Err(JudgeError::Config("concurrency must be at least 1".to_string()));
        }
        if timeout.is_zero() {
            return Err(JudgeError::Config("timeout must be greater than zero".to_string()));
        }
        if mode == SandboxMode::Unresolved {
            return Err(JudgeError::Sandbox(
                "refusing to evaluate with an unresolved sandbox mode".to_string(),
            ));
        }
        if mode == SandboxMode::Unsandboxed {
            log::warn!("UNSANDBOXED: untrusted completions run directly on this host");
        }

        let started = Instant::now();
        let (tx, rx) = bounded::<Completion>(concurrency * self.queue_multiplier);
        let outcomes = Mutex::new(Vec::new());
        let mut submitted = 0usize;
        let mut interrupted = false;

        thread::scope(|scope| -> Result<()> {
            for worker_id in 0..concurrency {
                let rx = rx.clone();
                let outcomes = &outcomes;
                thread::Builder::new()
                    .name(format!("judgebox-worker-{}", worker_id))
                    .spawn_scoped(scope, move || {
                        self.worker_loop(worker_id, rx, outcomes, timeout, mode)
                    })?;
            }
            drop(rx);

            'feed: for completion in completions {
                if self.shutdown.is_triggered() {
                    interrupted = true;
                    break;
                }

                submitted += 1;
                self.registry.queued.inc();
                let mut pending = completion;
                loop {
                    match tx.send_timeout(pending, PRODUCER_POLL) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(back)) => {
                            if self.shutdown.is_triggered() {
                                self.registry.queued.dec();
                                self.push(&outcomes, ExecutionOutcome::cancelled(&back));
                                interrupted = true;
                                break 'feed;
                            }
                            pending = back;
                        }
                        Err(SendTimeoutError::Disconnected(back)) => {
                            self.registry.queued.dec();
                            self.push(
                                &outcomes,
                                ExecutionOutcome::internal_error(&back, "no live workers"),
                            );
                            break 'feed;
                        }
                    }
                }
            }

            // Closing the queue lets idle workers exit once it drains.
            drop(tx);
            Ok(())
        })?;

        let outcomes = outcomes.into_inner().unwrap_or_else(|e| e.into_inner());
        if outcomes.len() != submitted {
            log::error!(
                "outcome count mismatch: submitted={} outcomes={}",
                submitted,
                outcomes.len()
            );
        }

        interrupted |= self.shutdown.is_triggered();
        let elapsed = started.elapsed();
        log::info!(
            "Pool finished: {} outcomes from {} submissions in {:.2}s (interrupted={})",
            outcomes.len(),
            submitted,
            elapsed.as_secs_f64(),
            interrupted
        );

        Ok(PoolReport {
            outcomes,
            submitted,
            interrupted,
            elapsed,
        })
    }

    fn worker_loop(
        &self,
        worker_id: usize,
        rx: Receiver<Completion>,
        outcomes: &Mutex<Vec<ExecutionOutcome>>,
        timeout: Duration,
        mode: SandboxMode,
    ) {
        log::trace!("worker {} started", worker_id);

        for completion in rx.iter() {
            self.registry.queued.dec();
            let outcome = self.evaluate(&completion, timeout, mode);
            self.push(outcomes, outcome);
        }

        log::trace!("worker {} exiting", worker_id);
    }

    fn evaluate(&self, completion: &Completion, timeout: Duration, mode: SandboxMode) -> ExecutionOutcome {
        if self.shutdown.is_triggered() {
            return ExecutionOutcome::cancelled(completion);
        }

        let verdict = self.filter.filter(completion);
        if let Some(reason) = verdict.reason {
            return ExecutionOutcome::filtered(completion, reason);
        }

        self.registry.in_flight.inc();
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.executor.execute(completion, mode, timeout, &self.limits)
        }));
        self.registry.in_flight.dec();

        result.unwrap_or_else(|_| {
            log::error!(
                "executor panicked on {}#{}",
                completion.task_id,
                completion.sample_index
            );
            ExecutionOutcome::internal_error(completion, "executor panicked")
        })
    }

    /// The lock covers only the append.
    fn push(&self, outcomes: &Mutex<Vec<ExecutionOutcome>>, outcome: ExecutionOutcome) {
        self.registry.record_outcome(&outcome);
        let mut guard = outcomes.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(outcome);
        let done = guard.len();
        drop(guard);

        if done % PROGRESS_INTERVAL == 0 {
            log::info!("{} samples evaluated", done);
        }
    }
}
