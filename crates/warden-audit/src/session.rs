//! Per-session state persistence.
//!
//! One JSON file per session under `sessions/`, overwritten atomically
//! (write-temp-then-rename) on every change. State for an unknown
//! session is created on first access with a freshly generated signing
//! keypair. Concurrent access within one process is serialized here;
//! two processes writing the same session id is an unsupported
//! configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};
use warden_types::error::{WardenError, WardenResult};
use warden_types::session::SessionState;

use crate::signer;

/// File-backed store of per-session state.
pub struct SessionStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    /// Opens (creating if necessary) a session store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> WardenResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Loads a session's state, or creates it with a fresh keypair if
    /// this is the session's first appearance.
    pub fn load_or_create(
        &self,
        session_id: &str,
        policy_entity_id: &str,
    ) -> WardenResult<SessionState> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path(session_id);
        if path.exists() {
            return self.read(&path);
        }

        let state = SessionState {
            session_id: session_id.to_string(),
            started_at: Utc::now().to_rfc3339(),
            action_index: 0,
            last_r6_id: String::new(),
            tool_counts: BTreeMap::new(),
            category_counts: BTreeMap::new(),
            policy_entity_id: policy_entity_id.to_string(),
            signing: signer::generate_identity(),
        };
        self.write(&path, &state)?;
        info!(
            session = session_id,
            key_id = %state.signing.key_id,
            "Session created with new signing keypair"
        );
        Ok(state)
    }

    /// Loads a session's state if it exists.
    pub fn load(&self, session_id: &str) -> WardenResult<Option<SessionState>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        self.read(&path).map(Some)
    }

    /// Overwrites a session's state. Last write wins.
    pub fn save(&self, state: &SessionState) -> WardenResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path(&state.session_id);
        self.write(&path, state)?;
        debug!(
            session = %state.session_id,
            action_index = state.action_index,
            "Session state saved"
        );
        Ok(())
    }

    fn read(&self, path: &Path) -> WardenResult<SessionState> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            WardenError::Storage(format!(
                "session state at {} is unreadable: {e}",
                path.display()
            ))
        })
    }

    fn write(&self, path: &Path, state: &SessionState) -> WardenResult<()> {
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string(state)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }
}

/// Session ids are host-defined opaque strings; anything that could
/// escape the sessions directory is mapped to `_`.
pub(crate) fn file_stem(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_then_load() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let created = store.load_or_create("sess-1", "policy:safety:1:abc").unwrap();
        assert_eq!(created.action_index, 0);
        assert_eq!(created.signing.key_id.len(), 32);

        let loaded = store.load_or_create("sess-1", "policy:other:1:def").unwrap();
        // Existing state wins: same keys, original policy binding.
        assert_eq!(loaded.signing.public_key_hex, created.signing.public_key_hex);
        assert_eq!(loaded.policy_entity_id, "policy:safety:1:abc");
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let mut state = store.load_or_create("sess-1", "policy:p:1:x").unwrap();
        state.action_index = 7;
        state.last_r6_id = "r6:abcd1234".to_string();
        store.save(&state).unwrap();

        let loaded = store.load("sess-1").unwrap().unwrap();
        assert_eq!(loaded.action_index, 7);
        assert_eq!(loaded.last_r6_id, "r6:abcd1234");
    }

    #[test]
    fn test_missing_session_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_hostile_session_id_stays_in_directory() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.load_or_create("../escape/attempt", "policy:p:1:x").unwrap();
        // Everything the store wrote stayed under its directory.
        assert!(dir.path().join(".._escape_attempt.json").exists());
    }

    #[test]
    fn test_distinct_sessions_get_distinct_keys() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let a = store.load_or_create("a", "policy:p:1:x").unwrap();
        let b = store.load_or_create("b", "policy:p:1:x").unwrap();
        assert_ne!(a.signing.public_key_hex, b.signing.public_key_hex);
    }
}
