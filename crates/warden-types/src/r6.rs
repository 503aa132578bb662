//! The R6 request envelope: Rules, Role, Request, Reference, Resource.
//!
//! One immutable R6Request is assembled per tool call before it runs; the
//! matching Result lands in the audit record afterwards. The Reference
//! block chains requests within a session by id and position.

use serde::{Deserialize, Serialize};

use crate::category::ToolCategory;
use crate::policy::AuditLevel;

/// Binding type for a session-scoped software identity without hardware
/// backing.
pub const BINDING_SOFT_LCT: &str = "soft-lct";

/// Rules: the policy context the call was decided under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Rules {
    /// How much detail downstream records carry.
    pub audit_level: AuditLevel,
    /// Constraint strings from policy evaluation.
    pub constraints: Vec<String>,
    /// Content-addressed id of the active policy bundle
    /// (`policy:<name>:<version>:<sha256-hex>`).
    pub policy_entity_id: String,
}

/// Role: who is acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Role {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Zero-based position of this call within the session.
    pub action_index: u64,
    /// Always `"soft-lct"` for session-scoped identities.
    pub binding_type: String,
}

/// Request: what is being invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Call {
    pub tool_name: String,
    pub category: ToolCategory,
    /// Primary target extracted from the tool parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Secondary targets, present only when they add information beyond
    /// the primary target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    /// First 16 hex chars of SHA-256 over the canonical parameter JSON.
    pub input_hash: String,
}

/// Reference: linkage to the rest of the session's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Reference {
    pub session_id: String,
    /// Id of the previous R6 request in this session; empty for the first.
    pub previous_r6_id: String,
    /// Equals the action index.
    pub chain_position: u64,
}

/// Resource: cost and approval expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Resource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
    pub approval_required: bool,
}

/// The complete request envelope, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Request {
    /// `r6:` followed by a random 8-char identifier.
    pub id: String,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    pub rules: R6Rules,
    pub role: R6Role,
    pub request: R6Call,
    pub reference: R6Reference,
    pub resource: R6Resource,
}

impl R6Request {
    /// The random suffix after the `r6:` prefix, used to derive the
    /// audit record id.
    pub fn suffix(&self) -> &str {
        self.id.strip_prefix("r6:").unwrap_or(&self.id)
    }
}
