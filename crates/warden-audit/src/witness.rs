//! Policy-entity witnessing ledger.
//!
//! An append-only JSONL file binding policy entity ids to the sessions
//! that loaded them, so an auditor can answer "which sessions ever ran
//! under bundle X" without replaying every audit log. Best-effort, like
//! the event stream.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_types::error::WardenResult;

/// One witnessing assertion: `witness_id` observed `witnessed_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessEntry {
    /// The observing party, typically a session id.
    pub witness_id: String,
    /// The observed entity, typically a policy entity id.
    pub witnessed_id: String,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Append-only witnessing ledger.
pub struct WitnessLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl WitnessLedger {
    /// A ledger appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Appends one witnessing entry. Best-effort: failures are logged,
    /// never raised.
    pub fn witness(&self, witness_id: &str, witnessed_id: &str, note: Option<String>) {
        let entry = WitnessEntry {
            witness_id: witness_id.to_string(),
            witnessed_id: witnessed_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            note,
        };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Witness entry serialization failed");
                return;
            }
        };
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Witness append failed");
        }
    }

    /// Reads the whole ledger.
    pub fn entries(&self) -> WardenResult<Vec<WitnessEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(std::fs::File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "Skipping unparseable witness entry"),
            }
        }
        Ok(entries)
    }
}
