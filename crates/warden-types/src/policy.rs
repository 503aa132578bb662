//! Policy rule and configuration types.
//!
//! A policy bundle is an ordered list of rules plus a default decision.
//! Rules match on any AND-combined subset of tool names, categories,
//! target patterns, rate limits, and time windows; the lowest-priority
//! matching rule wins, ties broken by insertion order.

use serde::{Deserialize, Serialize};

use crate::category::ToolCategory;

/// The decision a rule (or the default policy) renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The call may proceed.
    Allow,
    /// The call may proceed, but the decision is flagged.
    Warn,
    /// The call must be blocked (when enforcement is on).
    Deny,
}

impl std::fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Deny => "deny",
        };
        write!(f, "{s}")
    }
}

/// How much detail audit records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Record ids, hashes, and outcomes only.
    Minimal,
    /// The default level.
    Standard,
    /// Include secondary targets and constraint detail.
    Verbose,
}

impl Default for AuditLevel {
    fn default() -> Self {
        Self::Standard
    }
}

/// A sliding-window rate limit attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    /// Maximum admitted events inside the window.
    pub max_count: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// A temporal window restricting when a rule applies.
///
/// `allowed_hours = [start, end]` passes while `start <= hour < end`;
/// a start greater than the end wraps past midnight. `allowed_days`
/// uses 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeWindow {
    /// Inclusive start hour and exclusive end hour, 0-23.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_hours: Option<[u32; 2]>,
    /// Days of the week the rule applies on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_days: Option<Vec<u32>>,
    /// `"utc"`, `"local"`, or a fixed offset such as `"+05:30"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Match criteria for a rule. Present fields are AND-combined; an empty
/// match block matches every call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleMatch {
    /// Exact tool names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Tool categories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<ToolCategory>>,
    /// Glob patterns (or raw regexes, see below) against the primary target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_patterns: Option<Vec<String>>,
    /// When true, `target_patterns` are raw regexes instead of globs.
    pub target_patterns_are_regex: bool,
    /// The rule fires only when this limit is already exceeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSpec>,
    /// The rule only applies inside this window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
}

/// A single policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Stable identifier referenced by audit records and events.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Lower priorities are evaluated first.
    pub priority: i32,
    /// Match criteria.
    #[serde(rename = "match", default)]
    pub match_spec: RuleMatch,
    /// Decision rendered when the rule matches.
    pub decision: PolicyDecision,
    /// Optional operator-facing reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A complete policy bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Bundle name, used in the policy entity id.
    #[serde(default = "default_policy_name")]
    pub name: String,
    /// Bundle version, used in the policy entity id.
    #[serde(default = "default_policy_version")]
    pub version: String,
    /// Decision when no rule matches.
    pub default_policy: PolicyDecision,
    /// When false, deny decisions are logged but not enforced (dry run).
    #[serde(default)]
    pub enforce: bool,
    /// Ordered rule list; preset rules (if any) are evaluated before these.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Optional preset bundle to prepend (`permissive`, `safety`,
    /// `strict`, `audit-only`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

fn default_policy_name() -> String {
    "custom".to_string()
}

fn default_policy_version() -> String {
    "1".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            version: default_policy_version(),
            default_policy: PolicyDecision::Allow,
            enforce: false,
            rules: Vec::new(),
            preset: None,
        }
    }
}

/// The outcome of evaluating one tool call against a policy bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    /// The raw decision of the matched rule (or the default policy).
    pub decision: PolicyDecision,
    /// Id of the matched rule, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// False only for a deny under a dry-run configuration.
    pub enforced: bool,
    /// Why the decision was rendered.
    pub reason: String,
    /// Constraint strings bound into the audit record
    /// (`ruleId=…`, `rateKey=…`, `window=[9,17)`).
    pub constraints: Vec<String>,
    /// Rate keys whose rules statically matched but whose windows still
    /// had room. The facade records these at post-call time for calls
    /// that actually ran.
    #[serde(skip)]
    pub admitted_rate_keys: Vec<String>,
    /// The rate key that tripped, when the matched rule fired because its
    /// sliding window was already full.
    #[serde(skip)]
    pub exceeded_rate_key: Option<String>,
}
