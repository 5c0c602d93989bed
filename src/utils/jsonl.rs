/// Streaming JSONL input and output
use crate::config::types::{Completion, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Deserialize)]
struct CompletionRecord {
    task_id: String,
    #[serde(default)]
    sample_index: Option<u32>,
    #[serde(alias = "source_text")]
    completion: String,
}

/// Lazily parses completion records, one per line.
///
/// Records without `sample_index` get the per-task arrival ordinal. Lines that
/// do not parse are logged and counted, never silently dropped.
pub struct CompletionReader<R> {
    lines: std::io::Lines<R>,
    line_number: usize,
    next_index: HashMap<String, u32>,
    malformed: Arc<AtomicUsize>,
}

impl<R: BufRead> CompletionReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            next_index: HashMap::new(),
            malformed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared count of lines rejected so far; stays valid after the reader is consumed.
    pub fn malformed_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.malformed)
    }

    fn assign_index(&mut self, record: CompletionRecord) -> Completion {
        let ordinal = self.next_index.entry(record.task_id.clone()).or_insert(0);
        let sample_index = match record.sample_index {
            Some(index) => {
                *ordinal = (*ordinal).max(index.saturating_add(1));
                index
            }
            None => {
                let index = *ordinal;
                *ordinal += 1;
                index
            }
        };

        Completion {
            task_id: record.task_id,
            sample_index,
            source_text: record.completion,
        }
    }
}

impl<R: BufRead> Iterator for CompletionReader<R> {
    type Item = Completion;

    fn next(&mut self) -> Option<Completion> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    log::error!("Failed to read completion input: {}", e);
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<CompletionRecord>(&line) {
                Ok(record) => return Some(self.assign_index(record)),
                Err(e) => {
                    log::warn!("Skipping malformed completion at line {}: {}", self.line_number, e);
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Write one JSON document per line
pub fn write_jsonl<T: Serialize, P: AsRef<Path>>(path: P, items: &[T]) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
