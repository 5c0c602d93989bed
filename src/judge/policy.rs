/// Source-level policy scanner
/// A regex deny-list over the assembled program. First matching rule wins.
use crate::config::types::{JudgeError, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub name: &'static str,
    pattern: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyScanner {
    rules: Vec<PolicyRule>,
}

impl PolicyScanner {
    pub fn new(rules: &[(&'static str, &'static str)]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|&(name, pattern)| {
                Regex::new(pattern)
                    .map(|pattern| PolicyRule { name, pattern })
                    .map_err(|e| {
                        JudgeError::Config(format!("invalid policy rule '{}': {}", name, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Name of the first violated rule, if any
    pub fn scan(&self, program: &str) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(program))
            .map(|rule| rule.name)
    }
}
