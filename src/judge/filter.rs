/// Cheap pre-evaluation filter
/// Rejects completions that cannot plausibly pass before they cost a sandbox launch.
/// This is a throughput optimization, not a security check.
use crate::config::types::{Completion, FilterReason, FilterVerdict};

#[derive(Debug, Clone)]
pub struct SampleFilter {
    min_length: usize,
    max_brace_imbalance: usize,
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_brace_imbalance: 3,
        }
    }
}

impl SampleFilter {
    pub fn new(min_length: usize, max_brace_imbalance: usize) -> Self {
        Self {
            min_length,
            max_brace_imbalance,
        }
    }

    pub fn filter(&self, completion: &Completion) -> FilterVerdict {
        self.check(&completion.source_text)
    }

    /// Rules apply to the trimmed text in order and short-circuit.
    pub fn check(&self, text: &str) -> FilterVerdict {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return FilterVerdict::rejected(FilterReason::Empty);
        }

        let mut length = 0usize;
        let mut open = 0usize;
        let mut close = 0usize;
        for ch in trimmed.chars() {
            length += 1;
            match ch {
                '{' => open += 1,
                '}' => close += 1,
                _ => {}
            }
        }

        if length < self.min_length {
            return FilterVerdict::rejected(FilterReason::TooShort);
        }

        if open.abs_diff(close) > self.max_brace_imbalance {
            return FilterVerdict::rejected(FilterReason::UnbalancedDelimiters);
        }

        FilterVerdict::kept()
    }
}
