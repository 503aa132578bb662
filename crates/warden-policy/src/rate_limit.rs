//! Sliding-window rate limiting with a durable SQLite sink.
//!
//! Counters survive restarts: each recorded event is a `(key,
//! timestamp_ms)` row, and a query counts rows younger than the window.
//! An event is in-window while `timestamp > now - window_ms`; an event
//! exactly `window_ms` old has expired.
//!
//! `check` never enforces; it reports whether the window still has
//! room. The caller records an event with `record` once the action has
//! actually been admitted.
//!
//! If the database cannot be opened, or a query or insert fails
//! mid-flight, the limiter falls through to an in-process map for that
//! call; the API does not change, only `is_persistent`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, warn};

/// The result of a window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    /// True while the window holds fewer than `limit` events.
    pub allowed: bool,
    /// Events currently in the window.
    pub current: u32,
    /// The configured maximum.
    pub limit: u32,
}

/// Sliding-window event counter keyed by arbitrary strings.
pub struct RateLimiter {
    conn: Option<Arc<Mutex<Connection>>>,
    fallback: Mutex<HashMap<String, Vec<i64>>>,
}

impl RateLimiter {
    /// Opens a durable limiter backed by a SQLite file, falling back to
    /// memory-only operation if the database cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::open_db(path) {
            Ok(conn) => {
                debug!(path = %path.display(), "Rate-limit store opened");
                Self {
                    conn: Some(Arc::new(Mutex::new(conn))),
                    fallback: Mutex::new(HashMap::new()),
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Rate-limit store unavailable, using in-memory counters"
                );
                Self::in_memory()
            }
        }
    }

    /// A limiter that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            conn: None,
            fallback: Mutex::new(HashMap::new()),
        }
    }

    /// Whether counters are durable across restarts.
    pub fn is_persistent(&self) -> bool {
        self.conn.is_some()
    }

    fn open_db(path: &Path) -> Result<Connection, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            // Missing parent surfaces as the open error below.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        // Sessions write concurrently; WAL tolerates interleaved inserts.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_events (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 key TEXT NOT NULL,
                 timestamp_ms INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_rate_events_key_ts
                 ON rate_events (key, timestamp_ms);",
        )?;
        Ok(conn)
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Counts events for `key` inside the window ending now.
    pub fn check(&self, key: &str, max_count: u32, window_ms: u64) -> RateCheck {
        self.check_at(key, max_count, window_ms, Self::now_ms())
    }

    /// Window check against an explicit clock.
    pub fn check_at(&self, key: &str, max_count: u32, window_ms: u64, now_ms: i64) -> RateCheck {
        let cutoff = now_ms - window_ms as i64;
        let mut current = 0u32;

        if let Some(conn) = &self.conn {
            match self.durable_count(conn, key, cutoff) {
                Ok(count) => current += count,
                Err(e) => {
                    warn!(key, error = %e, "Rate-limit query failed, memory counters only");
                }
            }
        }
        current += self.fallback_count(key, cutoff);

        RateCheck {
            allowed: current < max_count,
            current,
            limit: max_count,
        }
    }

    /// Appends one event for `key` at the current time.
    pub fn record(&self, key: &str) {
        self.record_at(key, Self::now_ms());
    }

    /// Appends one event for `key` at an explicit time.
    pub fn record_at(&self, key: &str, now_ms: i64) {
        if let Some(conn) = &self.conn {
            let result = conn
                .lock()
                .map_err(|e| e.to_string())
                .and_then(|conn| {
                    conn.execute(
                        "INSERT INTO rate_events (key, timestamp_ms) VALUES (?1, ?2)",
                        rusqlite::params![key, now_ms],
                    )
                    .map_err(|e| e.to_string())
                });
            match result {
                Ok(_) => return,
                Err(e) => {
                    warn!(key, error = %e, "Rate-limit insert failed, recording in memory");
                }
            }
        }
        let mut map = self.fallback.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_string()).or_default().push(now_ms);
    }

    /// Deletes events older than the window from both sinks and returns
    /// how many were removed.
    pub fn prune(&self, window_ms: u64) -> u64 {
        self.prune_at(window_ms, Self::now_ms())
    }

    /// Prune against an explicit clock.
    pub fn prune_at(&self, window_ms: u64, now_ms: i64) -> u64 {
        let cutoff = now_ms - window_ms as i64;
        let mut removed = 0u64;

        if let Some(conn) = &self.conn {
            let result = conn
                .lock()
                .map_err(|e| e.to_string())
                .and_then(|conn| {
                    conn.execute(
                        "DELETE FROM rate_events WHERE timestamp_ms <= ?1",
                        rusqlite::params![cutoff],
                    )
                    .map_err(|e| e.to_string())
                });
            match result {
                Ok(n) => removed += n as u64,
                Err(e) => warn!(error = %e, "Rate-limit prune failed"),
            }
        }

        let mut map = self.fallback.lock().unwrap_or_else(|e| e.into_inner());
        for events in map.values_mut() {
            let before = events.len();
            events.retain(|ts| *ts > cutoff);
            removed += (before - events.len()) as u64;
        }
        map.retain(|_, events| !events.is_empty());

        removed
    }

    fn durable_count(
        &self,
        conn: &Arc<Mutex<Connection>>,
        key: &str,
        cutoff: i64,
    ) -> Result<u32, String> {
        let conn = conn.lock().map_err(|e| e.to_string())?;
        // Lazy prune of this key's expired events.
        conn.execute(
            "DELETE FROM rate_events WHERE key = ?1 AND timestamp_ms <= ?2",
            rusqlite::params![key, cutoff],
        )
        .map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT COUNT(*) FROM rate_events WHERE key = ?1 AND timestamp_ms > ?2",
            rusqlite::params![key, cutoff],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u32)
        .map_err(|e| e.to_string())
    }

    fn fallback_count(&self, key: &str, cutoff: i64) -> u32 {
        let mut map = self.fallback.lock().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(key) {
            Some(events) => {
                events.retain(|ts| *ts > cutoff);
                events.len() as u32
            }
            None => 0,
        }
    }
}
