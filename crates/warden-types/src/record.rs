//! Audit record wire types.
//!
//! Field order in `AuditRecord` is the on-disk contract: the signature
//! covers the serialization of the record with `signature` and
//! `signingKeyId` absent, so those two fields must stay last and must be
//! skipped while unset.

use serde::{Deserialize, Serialize};

use crate::category::ToolCategory;

/// Outcome status of a recorded tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The tool ran and succeeded.
    Success,
    /// The tool ran and failed.
    Error,
    /// The call was denied at the gate and never ran.
    Blocked,
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

/// The result block of an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub status: CallStatus,
    /// Truncated SHA-256 of the tool output, when the host supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CallResult {
    /// A blocked result with the denial reason.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            status: CallStatus::Blocked,
            output_hash: None,
            error_message: Some(reason.into()),
            duration_ms: None,
        }
    }
}

/// Provenance block linking a record into its session chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub session_id: String,
    /// Dense, strictly increasing from 0 within a session.
    pub action_index: u64,
    /// Truncated SHA-256 of the previous on-disk line, or `"genesis"`.
    pub prev_record_hash: String,
}

/// The sentinel prev-hash of a session's first record.
pub const GENESIS_HASH: &str = "genesis";

/// One line of a per-session audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// `audit:` followed by the R6 request's random suffix.
    pub record_id: String,
    pub r6_request_id: String,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    pub tool: String,
    pub category: ToolCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    pub result: CallResult,
    pub provenance: Provenance,
    /// Hex-encoded Ed25519 signature over the unsigned serialization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Last 32 hex chars of the signer's public key hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,
}

impl AuditRecord {
    /// A copy of this record with the signature fields stripped: the
    /// exact value whose serialization the signature covers.
    pub fn without_signature(&self) -> AuditRecord {
        let mut copy = self.clone();
        copy.signature = None;
        copy.signing_key_id = None;
        copy
    }
}

/// Per-signature counters produced by chain verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStats {
    /// Records carrying a signature.
    pub signed: u64,
    /// Signatures checked against a supplied key and found valid.
    pub verified: u64,
    /// Signatures checked against a supplied key and found invalid.
    pub invalid: u64,
    /// Signatures present but with no key supplied to check them.
    pub unverified: u64,
}

/// The report returned by chain verification. Diagnostic, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// True iff `errors` is empty.
    pub valid: bool,
    pub record_count: u64,
    /// Human-readable descriptions of every broken link, bad signature,
    /// and unparseable line.
    pub errors: Vec<String>,
    pub signature_stats: SignatureStats,
}

/// Criteria for filtering a session's audit records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ToolCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    /// Glob matched against the record's primary target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_glob: Option<String>,
    /// ISO-8601 timestamp or a relative offset such as `15m`, `2h`, `7d`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}
