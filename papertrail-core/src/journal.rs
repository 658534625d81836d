//! Append-only JSONL audit journal.
//!
//! One JSON object per line, written compactly and flushed per record. The
//! file is opened in append mode and never truncated or rewritten, so records
//! from earlier runs that shared the path are preserved.
//!
//! A `Journal` is a single writer. Sharing one path between engines or threads
//! requires external serialization.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::domain::{OrderResult, TradePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    OrderFilled,
    RiskReject,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub event: JournalEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<TradePlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OrderResult>,
}

impl JournalRecord {
    pub fn filled(timestamp: f64, plan: &TradePlan, result: &OrderResult) -> Self {
        Self {
            timestamp,
            event: JournalEvent::OrderFilled,
            reason: None,
            order_id: None,
            plan: Some(plan.clone()),
            result: Some(result.clone()),
        }
    }

    pub fn rejected(timestamp: f64, reason: &str, plan: &TradePlan, result: &OrderResult) -> Self {
        Self {
            timestamp,
            event: JournalEvent::RiskReject,
            reason: Some(reason.to_string()),
            order_id: None,
            plan: Some(plan.clone()),
            result: Some(result.clone()),
        }
    }

    pub fn cancel(timestamp: f64, order_id: &str) -> Self {
        Self {
            timestamp,
            event: JournalEvent::Cancel,
            reason: None,
            order_id: Some(order_id.to_string()),
            plan: None,
            result: None,
        }
    }
}

pub struct Journal {
    path: PathBuf,
    file: File,
    written: u64,
}

impl Journal {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn append(&mut self, record: &JournalRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Read every record in a journal file. A missing file reads as empty.
    pub fn read_records(path: &Path) -> io::Result<Vec<JournalRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("written", &self.written)
            .finish()
    }
}
