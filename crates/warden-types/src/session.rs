//! Per-session state and signing identity.
//!
//! One `SessionState` exists per session, persisted as a single JSON
//! object that is overwritten on every change. The signing keypair is
//! generated when the session first appears and lives for the session's
//! lifetime; there is no rotation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of hex characters of the public key used as the key id.
pub const KEY_ID_LEN: usize = 32;

/// A session's Ed25519 signing identity, serialized as hex.
///
/// Key material is zeroized when the value is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SigningIdentity {
    /// Hex of the 32-byte private key. Never logged.
    pub private_key_hex: String,
    /// Hex of the 32-byte public key.
    pub public_key_hex: String,
    /// Last 32 hex chars of `public_key_hex`.
    pub key_id: String,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("private_key_hex", &"<redacted>")
            .field("public_key_hex", &self.public_key_hex)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl SigningIdentity {
    /// Derives the short key id from a public key hex string.
    pub fn key_id_of(public_key_hex: &str) -> String {
        let start = public_key_hex.len().saturating_sub(KEY_ID_LEN);
        public_key_hex[start..].to_string()
    }
}

/// Mutable per-session state, overwritten on every recorded call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    /// ISO-8601 UTC timestamp of the session's first call.
    pub started_at: String,
    /// Monotonic count of recorded calls; the next call's index.
    pub action_index: u64,
    /// Id of the last R6 request in this session's chain; empty before
    /// the first call.
    pub last_r6_id: String,
    /// Calls per tool name.
    pub tool_counts: BTreeMap<String, u64>,
    /// Calls per category wire name.
    pub category_counts: BTreeMap<String, u64>,
    /// Content-addressed id of the policy bundle this session runs under.
    pub policy_entity_id: String,
    pub signing: SigningIdentity,
}

impl SessionState {
    /// Bumps the per-tool and per-category counters for one call.
    pub fn count_call(&mut self, tool: &str, category: &crate::category::ToolCategory) {
        *self.tool_counts.entry(tool.to_string()).or_insert(0) += 1;
        *self
            .category_counts
            .entry(category.as_str().to_string())
            .or_insert(0) += 1;
    }
}
