/// Corpus metrics
/// Reduces the outcome set to per-task (n, c) counts, then to pass@k and the
/// corpus-level rates. Outcomes are keyed by (task_id, sample_index); order
/// never matters.
use crate::aggregate::pass_at_k::pass_at_k;
use crate::config::types::{ExecutionOutcome, FilterReason, FilteredAccounting, SandboxMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Samples in the pass@k denominator under the active accounting
    pub n: usize,
    pub c: usize,
    pub pass_at_k: BTreeMap<u32, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub pass_at_k: BTreeMap<u32, f64>,
    pub compile_rate: f64,
    pub policy_clean_rate: f64,
    pub filter_rate: f64,
    pub timeout_rate: f64,
    pub total_samples: usize,
    pub evaluated_samples: usize,
    pub filtered_samples: usize,
    pub filter_reasons: BTreeMap<FilterReason, usize>,
    /// Requested k values larger than the smallest per-task sample count
    pub skipped_k: Vec<u32>,
    pub accounting: FilteredAccounting,
    pub unsandboxed: bool,
    pub per_task: BTreeMap<String, TaskStats>,
}

#[derive(Clone, Debug)]
pub struct MetricsAggregator {
    accounting: FilteredAccounting,
    unsandboxed: bool,
}

impl MetricsAggregator {
    pub fn new(accounting: FilteredAccounting) -> Self {
        Self {
            accounting,
            unsandboxed: false,
        }
    }

    pub fn with_sandbox(mut self, mode: SandboxMode) -> Self {
        self.unsandboxed = mode == SandboxMode::Unsandboxed;
        self
    }

    pub fn aggregate(&self, outcomes: &[ExecutionOutcome], k_values: &[u32]) -> AggregateMetrics {
        let mut seen = HashSet::new();
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut filter_reasons = BTreeMap::new();
        let mut total = 0usize;
        let mut filtered = 0usize;
        let mut compiled = 0usize;
        let mut policy_clean = 0usize;
        let mut timed_out = 0usize;

        for outcome in outcomes {
            if !seen.insert(outcome.key()) {
                log::warn!(
                    "Ignoring duplicate outcome for {}#{}",
                    outcome.task_id,
                    outcome.sample_index
                );
                continue;
            }

            total += 1;
            let entry = counts.entry(outcome.task_id.clone()).or_insert((0, 0));

            if outcome.is_filtered() {
                filtered += 1;
                if let Some(reason) = outcome.filter_reason {
                    *filter_reasons.entry(reason).or_insert(0) += 1;
                }
                if self.accounting == FilteredAccounting::CountAsFailure {
                    entry.0 += 1;
                }
                continue;
            }

            entry.0 += 1;
            if outcome.passed {
                entry.1 += 1;
            }
            if outcome.compiled {
                compiled += 1;
            }
            if !outcome.policy_violation {
                policy_clean += 1;
            }
            if outcome.timed_out {
                timed_out += 1;
            }
        }

        // Tasks left with no samples (all filtered under Exclude) score 0.0
        // and do not constrain which k values are reportable.
        let min_n = counts.values().map(|&(n, _)| n).filter(|&n| n > 0).min();
        let (reported_k, skipped_k): (Vec<u32>, Vec<u32>) = {
            let mut ks: Vec<u32> = k_values.to_vec();
            ks.sort_unstable();
            ks.dedup();
            ks.into_iter()
                .partition(|&k| min_n.map_or(false, |n| k as usize <= n))
        };
        if !skipped_k.is_empty() {
            log::info!(
                "Skipping pass@k for k={:?}: some task has fewer samples",
                skipped_k
            );
        }

        let per_task: BTreeMap<String, TaskStats> = counts
            .into_iter()
            .map(|(task_id, (n, c))| {
                let scores = reported_k
                    .iter()
                    .map(|&k| (k, pass_at_k(n, c, k as usize)))
                    .collect();
                (task_id, TaskStats { n, c, pass_at_k: scores })
            })
            .collect();

        let corpus = reported_k
            .iter()
            .map(|&k| {
                let sum: f64 = per_task.values().map(|t| t.pass_at_k[&k]).sum();
                (k, sum / per_task.len() as f64)
            })
            .collect();

        AggregateMetrics {
            pass_at_k: corpus,
            compile_rate: ratio(compiled, total),
            policy_clean_rate: ratio(policy_clean, total),
            filter_rate: ratio(filtered, total),
            timeout_rate: ratio(timed_out, total),
            total_samples: total,
            evaluated_samples: total - filtered,
            filtered_samples: filtered,
            filter_reasons,
            skipped_k,
            accounting: self.accounting,
            unsandboxed: self.unsandboxed,
            per_task,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
