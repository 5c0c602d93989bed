/// Result files
/// results.jsonl holds one outcome per line; metrics.json holds the aggregate
/// together with the effective configuration and sandbox decision.
use crate::aggregate::AggregateMetrics;
use crate::config::loader::EvalConfig;
use crate::config::types::{ExecutionOutcome, Result, SandboxDecisionStatus, SandboxMode};
use crate::sandbox::SandboxDecision;
use crate::utils::jsonl::write_jsonl;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const RESULTS_FILE: &str = "results.jsonl";
pub const METRICS_FILE: &str = "metrics.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRecord {
    pub mode: SandboxMode,
    pub status: SandboxDecisionStatus,
    pub unsandboxed: bool,
}

impl From<&SandboxDecision> for SandboxRecord {
    fn from(decision: &SandboxDecision) -> Self {
        Self {
            mode: decision.mode,
            status: decision.status,
            unsandboxed: decision.is_unsandboxed(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsDocument {
    pub metrics: AggregateMetrics,
    pub config: EvalConfig,
    pub sandbox: SandboxRecord,
    /// RFC 3339
    pub timestamp: String,
}

impl MetricsDocument {
    pub fn new(metrics: AggregateMetrics, config: EvalConfig, sandbox: SandboxRecord) -> Self {
        Self {
            metrics,
            config,
            sandbox,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rows are sorted by (task_id, sample_index) so reruns diff cleanly.
    pub fn write_results(&self, outcomes: &[ExecutionOutcome]) -> Result<PathBuf> {
        let mut sorted: Vec<&ExecutionOutcome> = outcomes.iter().collect();
        sorted.sort_by(|a, b| a.key().cmp(&b.key()));

        let path = self.dir.join(RESULTS_FILE);
        write_jsonl(&path, &sorted)?;
        log::info!("Wrote {} outcomes to {}", sorted.len(), path.display());
        Ok(path)
    }

    pub fn write_metrics(&self, document: &MetricsDocument) -> Result<PathBuf> {
        let path = self.dir.join(METRICS_FILE);
        self.write_json(&path, document)?;
        Ok(path)
    }

    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        atomic_write(path, content.as_bytes())?;
        Ok(())
    }
}

/// Write to a sibling temp file, fsync, then rename over the target
pub(crate) fn atomic_write(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        target.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    {
        let mut f = fs::File::create(&temp_path)?;
        f.write_all(content)?;
        f.sync_all()?;
    }

    fs::rename(&temp_path, target)?;

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MetricsAggregator;
    use crate::config::types::{Completion, FilterReason, FilteredAccounting};

    fn outcomes() -> Vec<ExecutionOutcome> {
        vec![
            ExecutionOutcome::cancelled(&Completion::new("b", 0, "")),
            ExecutionOutcome::filtered(&Completion::new("a", 1, ""), FilterReason::TooShort),
            ExecutionOutcome::internal_error(&Completion::new("a", 0, ""), "spawn failed"),
        ]
    }

    #[test]
    fn test_results_sorted_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path().join("out")).unwrap();
        let path = writer.write_results(&outcomes()).unwrap();

        let rows: Vec<ExecutionOutcome> = fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let keys: Vec<_> = rows.iter().map(|o| (o.task_id.as_str(), o.sample_index)).collect();
        assert_eq!(keys, vec![("a", 0), ("a", 1), ("b", 0)]);
        assert_eq!(rows[1].filter_reason, Some(FilterReason::TooShort));
        assert_eq!(rows[0].filter_reason, None);
    }

    #[test]
    fn test_filter_reason_only_on_filtered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path()).unwrap();
        let path = writer.write_results(&outcomes()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.matches("filter_reason").count(), 1);
    }

    #[test]
    fn test_metrics_document() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path()).unwrap();
        let metrics = MetricsAggregator::new(FilteredAccounting::CountAsFailure)
            .with_sandbox(SandboxMode::Unsandboxed)
            .aggregate(&outcomes(), &[1]);
        let mut config = EvalConfig::default();
        config.confirm_unsandboxed = Some("I UNDERSTAND THE RISKS".to_string());
        let document = MetricsDocument::new(
            metrics,
            config,
            SandboxRecord {
                mode: SandboxMode::Unsandboxed,
                status: SandboxDecisionStatus::Unsandboxed,
                unsandboxed: true,
            },
        );

        let path = writer.write_metrics(&document).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert_eq!(value["sandbox"]["unsandboxed"], true);
        assert_eq!(value["sandbox"]["mode"], "unsandboxed");
        assert_eq!(value["metrics"]["total_samples"], 3);
        assert!(chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok());
        // The confirmation token is never persisted.
        assert!(!content.contains("I UNDERSTAND THE RISKS"));
    }
}
