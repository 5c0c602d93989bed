/// Benchmark problems keyed by task id
/// The executed program is `prompt + completion + "\n" + test`.
use crate::config::types::{Completion, JudgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub task_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub test: String,
}

#[derive(Clone, Debug, Default)]
pub struct ProblemSet {
    problems: HashMap<String, Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_problems<I: IntoIterator<Item = Problem>>(problems: I) -> Self {
        Self {
            problems: problems
                .into_iter()
                .map(|p| (p.task_id.clone(), p))
                .collect(),
        }
    }

    /// Load a JSONL problem file. Blank lines are skipped; malformed lines are errors.
    pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            JudgeError::Config(format!("Failed to open problem file {}: {}", path.display(), e))
        })?;

        let mut problems = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let problem: Problem = serde_json::from_str(&line).map_err(|e| {
                JudgeError::Config(format!(
                    "{}:{}: invalid problem record: {}",
                    path.display(),
                    index + 1,
                    e
                ))
            })?;
            problems.push(problem);
        }

        log::info!("Loaded {} problems from {}", problems.len(), path.display());
        Ok(Self::from_problems(problems))
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&Problem> {
        self.problems.get(task_id)
    }

    /// Without a problem record the completion is the whole program.
    pub fn assemble(&self, completion: &Completion) -> String {
        match self.problems.get(&completion.task_id) {
            Some(problem) => format!(
                "{}{}\n{}",
                problem.prompt, completion.source_text, problem.test
            ),
            None => completion.source_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_assemble_with_problem() {
        let set = ProblemSet::from_problems(vec![Problem {
            task_id: "HumanEval/1".to_string(),
            prompt: "fn add(a: i32, b: i32) -> i32 {\n".to_string(),
            test: "#[test]\nfn check() { assert_eq!(add(2, 2), 4); }\n".to_string(),
        }]);
        let completion = Completion::new("HumanEval/1", 0, "    a + b\n}");
        let program = set.assemble(&completion);
        assert!(program.starts_with("fn add"));
        assert!(program.contains("    a + b\n}\n#[test]"));
    }

    #[test]
    fn test_assemble_without_problem() {
        let set = ProblemSet::new();
        let completion = Completion::new("free/0", 0, "echo hello world");
        assert_eq!(set.assemble(&completion), "echo hello world");
    }

    #[test]
    fn test_load_jsonl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"task_id":"a","prompt":"p","test":"t"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"task_id":"b","prompt":"q","test":"u"}}"#).unwrap();

        let set = ProblemSet::load_jsonl(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("b").unwrap().prompt, "q");
    }

    #[test]
    fn test_load_jsonl_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"task_id":"a"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        match ProblemSet::load_jsonl(file.path()) {
            Err(JudgeError::Config(msg)) => assert!(msg.contains(":2:")),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
