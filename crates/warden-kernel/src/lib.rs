//! Warden: a governance layer between an autonomous agent and its tools.
//!
//! For every proposed tool call the facade renders a policy decision
//! (allow / warn / deny), and for every completed call it appends a
//! signed, hash-linked record to a per-session audit log. The operator
//! can answer: what did the agent do, under what policy, and can I
//! prove it wasn't tampered with.
//!
//! ```no_run
//! use warden_kernel::{CallOutcome, Warden, WardenConfig};
//!
//! let warden = Warden::new(WardenConfig::default()).unwrap();
//! let params = serde_json::json!({"command": "ls -la"});
//!
//! let verdict = warden.pre_call("session-1", "Bash", &params).unwrap();
//! if !verdict.is_blocking() {
//!     // ... run the tool ...
//! }
//! warden
//!     .post_call("session-1", "Bash", &params, CallOutcome::success())
//!     .unwrap();
//! ```

pub mod config;
pub mod facade;

pub use config::{default_root, load_config, StorageLayout, WardenConfig};
pub use facade::{CallOutcome, RecordedCall, Verdict, Warden};

pub use warden_types::category::ToolCategory;
pub use warden_types::error::{WardenError, WardenResult};
pub use warden_types::policy::{PolicyConfig, PolicyDecision};
pub use warden_types::record::{AuditRecord, CallStatus, FilterCriteria, VerifyReport};
