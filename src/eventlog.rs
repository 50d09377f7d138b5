//! Append-only JSONL detection log.
//!
//! One JSON object per line, append-only, written per consumed event. The
//! reader skips unparsable lines so a torn final line (crash mid-append)
//! never poisons the log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::{DetectionEvent, EventSource};

/// One detection record as persisted to disk.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub timestamp: String,
    pub person_type: String,
    pub person_name: String,
    pub confidence: f32,
    pub source: EventSource,
}

impl LogRecord {
    pub fn from_event(event: &DetectionEvent) -> Self {
        Self {
            timestamp: event.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            person_type: event.classification().to_string(),
            person_name: event.decision.subject_name().to_string(),
            confidence: event.confidence(),
            source: event.source,
        }
    }
}

/// Handle on the JSONL log file. Creation is lazy: the file and its parent
/// directory appear on the first append.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &LogRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open event log {}", self.path.display()))?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to event log {}", self.path.display()))?;
        Ok(())
    }

    /// The last `limit` parsable records, oldest first. A missing file is an
    /// empty log; lines that fail to parse are skipped with a warning.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read event log {}", self.path.display()))
            }
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => log::warn!("skipping unparsable event log line: {}", err),
            }
        }
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }
}
