//! Unbiased pass@k estimator for functional correctness.

/// Probability that at least one of `k` samples drawn without replacement
/// from `n` samples (of which `c` are correct) passes.
///
/// Formula: `1 - C(n-c, k) / C(n, k)`, evaluated as the running product
/// `prod_{i=n-c+1..=n} (1 - k/i)` so large `n` never overflows.
///
/// Returns 1.0 whenever `n - c < k` (every draw of size `k` contains a
/// correct sample) and 0.0 when there are no samples at all. Callers are
/// expected to keep `k <= n`.
pub fn pass_at_k(n: usize, c: usize, k: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let c = c.min(n);
    if n - c < k {
        return 1.0;
    }

    let k = k as f64;
    let mut miss = 1.0f64;
    for i in (n - c + 1)..=n {
        miss *= 1.0 - k / i as f64;
    }

    1.0 - miss
}
