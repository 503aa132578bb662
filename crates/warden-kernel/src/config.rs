//! Configuration loading from `~/.warden/config.toml` with defaults.
//!
//! The storage layout is fixed relative to an operator-chosen root:
//!
//! ```text
//! audit/<sessionId>.jsonl     per-session audit chains
//! sessions/<sessionId>.json   per-session state
//! data/rate-limits.db         durable rate-limit store
//! events.jsonl (+ .1)         event stream and its one backup
//! witnesses.jsonl             policy witnessing ledger
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_types::event::Severity;
use warden_types::policy::{AuditLevel, PolicyConfig};

/// Top-level configuration for the governance facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Root directory for all governance storage. Defaults to
    /// `~/.warden`.
    pub storage_root: Option<PathBuf>,
    /// The active policy bundle.
    pub policy: PolicyConfig,
    /// Detail level for R6 envelopes and records.
    pub audit_level: AuditLevel,
    /// Events below this severity are dropped from the stream.
    pub min_severity: Severity,
    /// Optional agent identity stamped into R6 role blocks.
    pub agent_id: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            // Observe-everything, block-nothing posture out of the box.
            policy: PolicyConfig {
                name: "audit-only".to_string(),
                preset: Some("audit-only".to_string()),
                ..Default::default()
            },
            audit_level: AuditLevel::Standard,
            min_severity: Severity::Info,
            agent_id: None,
        }
    }
}

/// The default storage root: `~/.warden`.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".warden")
}

/// Load configuration from a TOML file, with defaults.
///
/// With no explicit path, `<default root>/config.toml` is tried. A
/// missing or malformed file falls back to defaults with a warning.
pub fn load_config(path: Option<&Path>) -> WardenConfig {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_root().join("config.toml"));

    if !config_path.exists() {
        return WardenConfig::default();
    }
    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<WardenConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                WardenConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            WardenConfig::default()
        }
    }
}

/// Resolved on-disk layout under one storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// A layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-session audit chains.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Per-session state files.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// The durable rate-limit database.
    pub fn rate_limit_db(&self) -> PathBuf {
        self.root.join("data").join("rate-limits.db")
    }

    /// The event stream file.
    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    /// The policy witnessing ledger.
    pub fn witnesses_path(&self) -> PathBuf {
        self.root.join("witnesses.jsonl")
    }
}
