// Config Validation
// Runs before any work starts; all problems are collected and reported together

use crate::config::loader::EvalConfig;
use crate::config::types::{JudgeError, Result};

const MAX_CONCURRENCY: usize = 1024;
const MAX_TIMEOUT_MS: u64 = 3_600_000;
const MIN_MEMORY_BYTES: u64 = 16 * 1024 * 1024;

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config at startup. Errors are fatal; warnings are logged.
pub fn validate_config(config: &EvalConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_concurrency(config, &mut result);
    validate_timeouts(config, &mut result);
    validate_k_values(config, &mut result);
    validate_limits(config, &mut result);

    if !result.is_valid() {
        return Err(JudgeError::Config(format!(
            "invalid configuration:\n  {}",
            result.errors.join("\n  ")
        )));
    }

    for warning in &result.warnings {
        log::warn!("{}", warning);
    }

    Ok(result)
}

fn validate_concurrency(config: &EvalConfig, result: &mut ValidationResult) {
    if config.concurrency == 0 || config.concurrency > MAX_CONCURRENCY {
        result.add_error(format!(
            "concurrency must be between 1 and {} (got {})",
            MAX_CONCURRENCY, config.concurrency
        ));
    }
}

fn validate_timeouts(config: &EvalConfig, result: &mut ValidationResult) {
    if config.timeout_ms == 0 || config.timeout_ms > MAX_TIMEOUT_MS {
        result.add_error(format!(
            "timeout must be in (0, 3600] seconds (got {} ms)",
            config.timeout_ms
        ));
    }

    if config.compile_timeout_ms == 0 {
        result.add_error("compile timeout must be greater than zero".to_string());
    }

    if config.timeout_ms < 100 && config.timeout_ms > 0 {
        result.add_warning(format!(
            "timeout of {} ms leaves little room for process startup",
            config.timeout_ms
        ));
    }
}

fn validate_k_values(config: &EvalConfig, result: &mut ValidationResult) {
    if config.k_values.is_empty() {
        result.add_error("at least one k value is required".to_string());
    }

    if config.k_values.iter().any(|&k| k == 0) {
        result.add_error("k values must be at least 1".to_string());
    }
}

fn validate_limits(config: &EvalConfig, result: &mut ValidationResult) {
    if let Some(memory) = config.limits.memory_limit {
        if memory < MIN_MEMORY_BYTES {
            result.add_error(format!(
                "memory limit must be at least 16 MiB (got {} bytes)",
                memory
            ));
        }
    }

    if config.limits.process_limit == Some(0) {
        result.add_error("process limit must be greater than zero".to_string());
    }

    if config.limits.output_limit == 0 {
        result.add_warning("output limit of 0 discards all program output".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&EvalConfig::default()).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_errors_are_collected_together() {
        let config = EvalConfig {
            concurrency: 0,
            timeout_ms: 0,
            k_values: vec![0],
            ..EvalConfig::default()
        };

        match validate_config(&config) {
            Err(JudgeError::Config(msg)) => {
                assert!(msg.contains("concurrency"));
                assert!(msg.contains("timeout"));
                assert!(msg.contains("k values"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_upper_bound() {
        let config = EvalConfig {
            timeout_ms: MAX_TIMEOUT_MS + 1,
            ..EvalConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_small_memory_limit_rejected() {
        let mut config = EvalConfig::default();
        config.limits.memory_limit = Some(1024);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_k_values_rejected() {
        let config = EvalConfig {
            k_values: Vec::new(),
            ..EvalConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
