//! Real-time JSONL event side-channel.
//!
//! Orthogonal to the audit chain: unsigned, best-effort, and safe to
//! lose. Emission never propagates an error to the caller; a write
//! failure goes to stderr and the tool call proceeds. The file rotates
//! to a single `.1` backup when it reaches the size cap, and rotation
//! failures are swallowed.

use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;
use warden_types::event::{GovernanceEvent, Severity};

/// Rotation threshold: 100 MiB.
pub const MAX_STREAM_BYTES: u64 = 100 * 1024 * 1024;

type EventCallback = Arc<dyn Fn(&GovernanceEvent) + Send + Sync>;

/// Append-only JSONL emitter with severity filtering and size-bounded
/// rotation.
pub struct EventStream {
    path: PathBuf,
    min_severity: Severity,
    max_bytes: u64,
    write_lock: Mutex<()>,
    callbacks: Mutex<Vec<EventCallback>>,
}

impl EventStream {
    /// A stream appending to `path`, dropping events below
    /// `min_severity`.
    pub fn new(path: impl Into<PathBuf>, min_severity: Severity) -> Self {
        Self {
            path: path.into(),
            min_severity,
            max_bytes: MAX_STREAM_BYTES,
            write_lock: Mutex::new(()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the rotation threshold.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Registers an in-process observer. Observer panics are contained
    /// and do not reach the emitting call.
    pub fn on_event(&self, callback: impl Fn(&GovernanceEvent) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Emits one event: severity gate, callbacks, rotation check,
    /// append. Best-effort throughout.
    pub fn emit(&self, event: &GovernanceEvent) {
        if event.severity < self.min_severity {
            return;
        }

        // Snapshot under the lock, invoke outside it: observers must
        // never run while a stream lock is held.
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in &callbacks {
            let _ = catch_unwind(AssertUnwindSafe(|| callback(event)));
        }

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("warden: event serialization failed: {e}");
                return;
            }
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.rotate_if_needed();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")
            });
        if let Err(e) = result {
            eprintln!("warden: event append failed: {e}");
        }
    }

    /// Renames the stream to `<path>.1` once it reaches the size cap,
    /// replacing any previous backup. Failures are swallowed.
    fn rotate_if_needed(&self) {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size < self.max_bytes {
            return;
        }
        let backup = backup_path(&self.path);
        let _ = std::fs::remove_file(&backup);
        if std::fs::rename(&self.path, &backup).is_ok() {
            debug!(path = %self.path.display(), "Event stream rotated");
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".1");
    PathBuf::from(name)
}
