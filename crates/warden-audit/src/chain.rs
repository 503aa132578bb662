//! Per-session append-only audit log with hash linking and signatures.
//!
//! Each session owns one JSONL file. Every record carries the truncated
//! SHA-256 of the previous line exactly as it was written to disk (the
//! first record carries the literal `"genesis"`), and an Ed25519
//! signature over its own serialization with the signature fields
//! absent. Tampering with any byte of any line breaks either that
//! line's signature or the next line's link.
//!
//! Appends are write-through: a record that cannot be flushed to disk
//! is a hard error. Verification is the opposite: diagnostic,
//! best-effort, and never an exception.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use warden_types::error::{WardenError, WardenResult};
use warden_types::hash::short_hash;
use warden_types::r6::R6Request;
use warden_types::record::{
    AuditRecord, CallResult, FilterCriteria, Provenance, SignatureStats, VerifyReport,
    GENESIS_HASH,
};
use warden_types::session::SigningIdentity;

use crate::session::file_stem;
use crate::signer;

struct ChainInner {
    file: File,
    prev_hash: String,
    record_count: u64,
}

/// The append-only audit chain of one session.
pub struct AuditChain {
    path: PathBuf,
    session_id: String,
    signing: Option<SigningIdentity>,
    inner: Mutex<ChainInner>,
}

impl AuditChain {
    /// Opens (creating if necessary) the chain for `session_id` under
    /// `dir`. An existing log is scanned to restore the record count
    /// and the hash of its last line.
    pub fn open(
        dir: impl AsRef<Path>,
        session_id: &str,
        signing: Option<SigningIdentity>,
    ) -> WardenResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.jsonl", file_stem(session_id)));

        let mut prev_hash = GENESIS_HASH.to_string();
        let mut record_count = 0u64;
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                prev_hash = short_hash(line.as_bytes());
                record_count += 1;
            }
            debug!(
                session = session_id,
                records = record_count,
                "Resumed existing audit chain"
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            session_id: session_id.to_string(),
            signing,
            inner: Mutex::new(ChainInner {
                file,
                prev_hash,
                record_count,
            }),
        })
    }

    /// The log file this chain appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in the chain, including any found at open.
    pub fn record_count(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_count
    }

    /// Assembles, signs, and appends one record. Returns the record as
    /// written. Fails loudly on any storage error.
    pub fn record(&self, r6: &R6Request, result: CallResult) -> WardenResult<AuditRecord> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut record = AuditRecord {
            record_id: format!("audit:{}", r6.suffix()),
            r6_request_id: r6.id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            tool: r6.request.tool_name.clone(),
            category: r6.request.category,
            target: r6.request.target.clone(),
            targets: r6.request.targets.clone(),
            result,
            provenance: Provenance {
                session_id: self.session_id.clone(),
                action_index: r6.role.action_index,
                prev_record_hash: inner.prev_hash.clone(),
            },
            signature: None,
            signing_key_id: None,
        };

        if let Some(identity) = &self.signing {
            // The signature covers the serialization with both
            // signature fields absent.
            let payload = serde_json::to_string(&record)?;
            record.signature = Some(signer::sign(&identity.private_key_hex, payload.as_bytes())?);
            record.signing_key_id = Some(identity.key_id.clone());
        }

        let line = serde_json::to_string(&record)?;
        inner.file.write_all(line.as_bytes())?;
        inner.file.write_all(b"\n")?;
        inner.file.flush()?;

        inner.prev_hash = short_hash(line.as_bytes());
        inner.record_count += 1;
        debug!(
            session = %self.session_id,
            record = %record.record_id,
            index = record.provenance.action_index,
            "Audit record appended"
        );
        Ok(record)
    }

    /// Walks the whole log, checking every hash link and (where keys
    /// are supplied) every signature.
    pub fn verify(&self, public_keys: Option<&HashMap<String, String>>) -> WardenResult<VerifyReport> {
        verify_log(&self.path, public_keys)
    }

    /// Loads records matching the criteria.
    pub fn filter(&self, criteria: &FilterCriteria) -> WardenResult<Vec<AuditRecord>> {
        filter_log(&self.path, criteria)
    }

    /// The most recent `n` records.
    pub fn last_n(&self, n: usize) -> WardenResult<Vec<AuditRecord>> {
        let records = load_records(&self.path)?;
        let start = records.len().saturating_sub(n);
        Ok(records[start..].to_vec())
    }
}

/// Verifies a session log on disk without constructing a chain.
///
/// The report is diagnostic: broken links, bad signatures, and
/// unparseable lines accumulate in `errors` while the walk continues
/// best-effort. A missing file is an empty, valid chain.
pub fn verify_log(
    path: &Path,
    public_keys: Option<&HashMap<String, String>>,
) -> WardenResult<VerifyReport> {
    let mut errors = Vec::new();
    let mut stats = SignatureStats::default();
    let mut record_count = 0u64;
    let mut expected_prev = GENESIS_HASH.to_string();

    if !path.exists() {
        return Ok(VerifyReport {
            valid: true,
            record_count: 0,
            errors,
            signature_stats: stats,
        });
    }

    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let index = record_count;
        record_count += 1;
        // The next link is computed from the on-disk bytes whether or
        // not this line parses.
        let line_hash = short_hash(line.as_bytes());

        let record: AuditRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                errors.push(format!("record {index}: unparseable line: {e}"));
                expected_prev = line_hash;
                continue;
            }
        };

        if record.provenance.prev_record_hash != expected_prev {
            errors.push(format!(
                "record {index}: prev-hash mismatch (expected {expected_prev}, found {})",
                record.provenance.prev_record_hash
            ));
        }
        if record.provenance.action_index != index {
            errors.push(format!(
                "record {index}: action index {} breaks denseness",
                record.provenance.action_index
            ));
        }

        if let Some(signature) = &record.signature {
            stats.signed += 1;
            let key = record
                .signing_key_id
                .as_ref()
                .and_then(|kid| public_keys.and_then(|keys| keys.get(kid)));
            match key {
                Some(public_key_hex) => {
                    let payload = serde_json::to_string(&record.without_signature())?;
                    if signer::verify(public_key_hex, payload.as_bytes(), signature) {
                        stats.verified += 1;
                    } else {
                        stats.invalid += 1;
                        errors.push(format!("record {index}: invalid signature"));
                    }
                }
                None => stats.unverified += 1,
            }
        }

        expected_prev = line_hash;
    }

    Ok(VerifyReport {
        valid: errors.is_empty(),
        record_count,
        errors,
        signature_stats: stats,
    })
}

/// Loads every parseable record from a session log.
pub fn load_records(path: &Path) -> WardenResult<Vec<AuditRecord>> {
    let mut records = Vec::new();
    if !path.exists() {
        return Ok(records);
    }
    let reader = BufReader::new(File::open(path)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), index, error = %e, "Skipping unparseable record"),
        }
    }
    Ok(records)
}

/// Filters a session log by tool, category, status, target glob, and age.
pub fn filter_log(path: &Path, criteria: &FilterCriteria) -> WardenResult<Vec<AuditRecord>> {
    let target_re = match &criteria.target_glob {
        Some(glob) => Some(warden_policy::matcher::compile_glob(glob)?),
        None => None,
    };
    let since = match &criteria.since {
        Some(spec) => Some(parse_since(spec, Utc::now()).ok_or_else(|| {
            WardenError::ConfigInvalid(format!(
                "bad since value '{spec}' (expected ISO-8601 or N(s|m|h|d))"
            ))
        })?),
        None => None,
    };

    let records = load_records(path)?;
    Ok(records
        .into_iter()
        .filter(|record| {
            if let Some(tool) = &criteria.tool {
                if &record.tool != tool {
                    return false;
                }
            }
            if let Some(category) = criteria.category {
                if record.category != category {
                    return false;
                }
            }
            if let Some(status) = criteria.status {
                if record.result.status != status {
                    return false;
                }
            }
            if let Some(re) = &target_re {
                match &record.target {
                    Some(target) if re.is_match(target) => {}
                    _ => return false,
                }
            }
            if let Some(since) = since {
                match DateTime::parse_from_rfc3339(&record.timestamp) {
                    Ok(ts) if ts.with_timezone(&Utc) >= since => {}
                    _ => return false,
                }
            }
            true
        })
        .collect())
}

/// Parses a `since` filter: ISO-8601, or a relative offset `N(s|m|h|d)`
/// meaning `now - N` units.
fn parse_since(spec: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(spec) {
        return Some(ts.with_timezone(&Utc));
    }
    let (amount, unit) = spec.split_at(spec.len().checked_sub(1)?);
    let amount: i64 = amount.parse().ok()?;
    let delta = match unit {
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        _ => return None,
    };
    Some(now - delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use warden_types::category::ToolCategory;
    use warden_types::policy::AuditLevel;
    use warden_types::record::CallStatus;

    use crate::r6::{R6Builder, R6Input};
    use crate::session::SessionStore;

    fn setup(dir: &Path) -> (AuditChain, warden_types::session::SessionState) {
        let store = SessionStore::new(dir.join("sessions")).unwrap();
        let state = store.load_or_create("sess-1", "policy:safety:1:abc").unwrap();
        let chain = AuditChain::open(
            dir.join("audit"),
            "sess-1",
            Some(state.signing.clone()),
        )
        .unwrap();
        (chain, state)
    }

    fn append_n(
        chain: &AuditChain,
        state: &mut warden_types::session::SessionState,
        n: usize,
    ) -> Vec<AuditRecord> {
        let builder = R6Builder::new(AuditLevel::Standard);
        let mut out = Vec::new();
        for i in 0..n {
            let params = json!({"file_path": format!("/src/file{i}.rs")});
            let r6 = builder
                .build(
                    state,
                    R6Input {
                        tool: "Read",
                        params: &params,
                        category: ToolCategory::FileRead,
                        target: Some(format!("/src/file{i}.rs")),
                        targets: None,
                        constraints: vec![],
                        agent_id: None,
                        approval_required: false,
                        estimated_tokens: None,
                    },
                )
                .unwrap();
            let record = chain
                .record(
                    &r6,
                    CallResult {
                        status: CallStatus::Success,
                        output_hash: None,
                        error_message: None,
                        duration_ms: Some(3),
                    },
                )
                .unwrap();
            state.action_index += 1;
            state.last_r6_id = r6.id.clone();
            out.push(record);
        }
        out
    }

    fn keys_of(state: &warden_types::session::SessionState) -> HashMap<String, String> {
        let mut keys = HashMap::new();
        keys.insert(
            state.signing.key_id.clone(),
            state.signing.public_key_hex.clone(),
        );
        keys
    }

    #[test]
    fn test_chain_links_and_signatures() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        let records = append_n(&chain, &mut state, 10);

        assert_eq!(records[0].provenance.prev_record_hash, GENESIS_HASH);
        for pair in records.windows(2) {
            let prev_line = serde_json::to_string(&pair[0]).unwrap();
            assert_eq!(
                pair[1].provenance.prev_record_hash,
                short_hash(prev_line.as_bytes())
            );
        }

        let report = chain.verify(Some(&keys_of(&state))).unwrap();
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.record_count, 10);
        assert_eq!(report.signature_stats.signed, 10);
        assert_eq!(report.signature_stats.verified, 10);
        assert_eq!(report.signature_stats.invalid, 0);
        assert_eq!(report.signature_stats.unverified, 0);
    }

    #[test]
    fn test_verify_without_keys_counts_unverified() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 3);

        let report = chain.verify(None).unwrap();
        assert!(report.valid);
        assert_eq!(report.signature_stats.signed, 3);
        assert_eq!(report.signature_stats.unverified, 3);
        assert_eq!(report.signature_stats.verified, 0);
    }

    #[test]
    fn test_verify_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 5);

        let keys = keys_of(&state);
        let first = chain.verify(Some(&keys)).unwrap();
        let second = chain.verify(Some(&keys)).unwrap();
        assert_eq!(first.valid, second.valid);
        assert_eq!(first.record_count, second.record_count);
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.signature_stats, second.signature_stats);
    }

    #[test]
    fn test_tampered_record_is_detected() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 10);

        // Flip one character inside record 5's target.
        let contents = std::fs::read_to_string(chain.path()).unwrap();
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        lines[5] = lines[5].replace("/src/file5.rs", "/src/file9.rs");
        std::fs::write(chain.path(), lines.join("\n") + "\n").unwrap();

        let report = chain.verify(Some(&keys_of(&state))).unwrap();
        assert!(!report.valid);
        // The mutation shows up either as a bad signature at record 5 or
        // as a broken link at record 6.
        assert!(report
            .errors
            .iter()
            .any(|e| e.starts_with("record 5") || e.starts_with("record 6")));
        assert!(report.signature_stats.invalid >= 1 || !report.errors.is_empty());
    }

    #[test]
    fn test_reopened_chain_continues_links() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 2);
        drop(chain);

        let chain = AuditChain::open(
            dir.path().join("audit"),
            "sess-1",
            Some(state.signing.clone()),
        )
        .unwrap();
        assert_eq!(chain.record_count(), 2);
        append_n(&chain, &mut state, 2);

        let report = chain.verify(Some(&keys_of(&state))).unwrap();
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.record_count, 4);
    }

    #[test]
    fn test_unparseable_line_reported_and_walk_continues() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 3);

        let contents = std::fs::read_to_string(chain.path()).unwrap();
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        lines[1] = "{not json".to_string();
        std::fs::write(chain.path(), lines.join("\n") + "\n").unwrap();

        let report = chain.verify(None).unwrap();
        assert!(!report.valid);
        assert_eq!(report.record_count, 3);
        assert!(report.errors.iter().any(|e| e.contains("unparseable")));
        // Record 2's link is also broken: its prev-hash points at the
        // original line 1 bytes.
        assert!(report.errors.iter().any(|e| e.starts_with("record 2")));
    }

    #[test]
    fn test_filter_by_tool_status_and_glob() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 4);

        let all = chain.filter(&FilterCriteria::default()).unwrap();
        assert_eq!(all.len(), 4);

        let by_tool = chain
            .filter(&FilterCriteria {
                tool: Some("Read".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_tool.len(), 4);

        let by_glob = chain
            .filter(&FilterCriteria {
                target_glob: Some("/src/file1.*".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_glob.len(), 1);
        assert_eq!(by_glob[0].target.as_deref(), Some("/src/file1.rs"));

        let blocked = chain
            .filter(&FilterCriteria {
                status: Some(CallStatus::Blocked),
                ..Default::default()
            })
            .unwrap();
        assert!(blocked.is_empty());
    }

    #[test]
    fn test_filter_since_relative() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 2);

        let recent = chain
            .filter(&FilterCriteria {
                since: Some("1h".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 2);

        // A bad since spec is a config error, not an empty result.
        assert!(chain
            .filter(&FilterCriteria {
                since: Some("yesterday".to_string()),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_parse_since() {
        let now = Utc::now();
        assert_eq!(parse_since("90s", now), Some(now - Duration::seconds(90)));
        assert_eq!(parse_since("15m", now), Some(now - Duration::minutes(15)));
        assert_eq!(parse_since("2h", now), Some(now - Duration::hours(2)));
        assert_eq!(parse_since("7d", now), Some(now - Duration::days(7)));
        assert!(parse_since("", now).is_none());
        assert!(parse_since("7w", now).is_none());
        let iso = parse_since("2026-01-01T00:00:00Z", now).unwrap();
        assert_eq!(iso.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_last_n() {
        let dir = TempDir::new().unwrap();
        let (chain, mut state) = setup(dir.path());
        append_n(&chain, &mut state, 5);

        let last = chain.last_n(2).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[1].provenance.action_index, 4);

        assert_eq!(chain.last_n(100).unwrap().len(), 5);
    }

    #[test]
    fn test_unsigned_chain() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();
        let mut state = store.load_or_create("sess-2", "policy:p:1:x").unwrap();
        let chain = AuditChain::open(dir.path().join("audit"), "sess-2", None).unwrap();
        append_n(&chain, &mut state, 2);

        let report = chain.verify(None).unwrap();
        assert!(report.valid);
        assert_eq!(report.signature_stats.signed, 0);
    }
}
