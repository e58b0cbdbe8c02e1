//! The append-only change log.
//!
//! Every committed mutation appends one [`AuditRecord`]. Records are chained:
//! each hash covers the previous record's hash plus the record's own content,
//! so the hash of the last record (the superhash) vouches for the whole
//! history. Records are never rewritten or compacted.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TypewrightError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub params: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub hash: String,
}

fn chain_hash(previous: Option<&str>, action: &str, params: &Value, timestamp: &DateTime<Utc>) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    if let Some(previous) = previous {
        hasher.update(previous.as_bytes());
    }
    hasher.update(action.as_bytes());
    hasher.update(params.to_string().as_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.finalize()
}

#[derive(Debug)]
pub struct Ledger {
    records: Vec<AuditRecord>,
    head: Option<blake3::Hash>,
    file: Option<PathBuf>,
}

impl Ledger {
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            head: None,
            file: None,
        }
    }
    /// Opens the log at `path`, verifying the chain of anything already in it.
    pub fn open(path: &Path) -> Result<Self> {
        let mut ledger = Self {
            records: Vec::new(),
            head: None,
            file: Some(path.to_path_buf()),
        };
        if !path.exists() {
            return Ok(ledger);
        }
        let reader = BufReader::new(File::open(path)?);
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(&line).map_err(|e| {
                TypewrightError::corruption(format!("change log line {} is unreadable: {}", number + 1, e))
            })?;
            let expected_previous = ledger.current_superhash();
            let hash = chain_hash(
                record.previous.as_deref(),
                &record.action,
                &record.params,
                &record.timestamp,
            );
            if record.previous != expected_previous || hash.to_hex().as_str() != record.hash {
                return Err(TypewrightError::corruption(format!(
                    "change log chain is broken at line {}",
                    number + 1
                )));
            }
            ledger.head = Some(hash);
            ledger.records.push(record);
        }
        debug!(records = ledger.records.len(), path = %path.display(), "change log verified");
        Ok(ledger)
    }
    pub fn append(&mut self, action: &str, params: Value) -> Result<&AuditRecord> {
        let timestamp = Utc::now();
        let previous = self.current_superhash();
        let hash = chain_hash(previous.as_deref(), action, &params, &timestamp);
        let record = AuditRecord {
            action: action.to_owned(),
            params,
            timestamp,
            previous,
            hash: hash.to_hex().to_string(),
        };
        if let Some(path) = &self.file {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
        self.head = Some(hash);
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }
    pub fn last(&self) -> Option<&AuditRecord> {
        self.records.last()
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    /// Hex digest of the newest record, or `None` while the log is empty.
    pub fn current_superhash(&self) -> Option<String> {
        self.head.map(|hash| hash.to_hex().to_string())
    }
}
