//! Event types for the governance JSONL side-channel.
//!
//! Events are orthogonal to the audit chain: unsigned, best-effort, and
//! meant for live tailing rather than proof. Null and empty fields are
//! stripped on the wire.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::category::ToolCategory;
use crate::policy::PolicyDecision;

/// Event severity, ordered `debug < info < warn < alert < error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Alert,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Alert => "alert",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The kinds of events the governance core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionEnd,
    ToolCall,
    ToolResult,
    PolicyDecision,
    PolicyViolation,
    RateLimitExceeded,
    AuditRecord,
    AuditAlert,
    SystemError,
}

/// One line on the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceEvent {
    /// The event kind.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    /// Severity; the stream drops events below its configured minimum.
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ToolCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<PolicyDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_before: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_after: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Free-form extra fields; omitted from the wire when empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl GovernanceEvent {
    /// Create a new event stamped with the current UTC time.
    pub fn new(event_type: EventType, severity: Severity) -> Self {
        Self {
            event_type,
            timestamp: Utc::now().to_rfc3339(),
            severity,
            session_id: None,
            agent_id: None,
            tool: None,
            target: None,
            category: None,
            decision: None,
            reason: None,
            rule_id: None,
            duration_ms: None,
            count: None,
            trust_before: None,
            trust_after: None,
            trust_delta: None,
            error: None,
            error_type: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach the originating session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the tool name.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Attach the primary target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach the tool category.
    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Attach the policy decision.
    pub fn with_decision(mut self, decision: PolicyDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Attach a reason string.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the matched rule id.
    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    /// Attach a duration in milliseconds.
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Attach an error description.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
