//! Ordered policy rule evaluation.
//!
//! Rules are validated and compiled once at load; evaluation walks them
//! in ascending priority (insertion order breaking ties) and returns the
//! first rule whose present criteria all hold. Evaluation never fails;
//! malformed inputs simply match nothing and fall through to the default
//! policy.

use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike, Utc};
use regex_lite::Regex;
use tracing::debug;
use warden_types::category::ToolCategory;
use warden_types::error::{WardenError, WardenResult};
use warden_types::hash::{canonical_json_bytes, sha256_hex};
use warden_types::policy::{
    PolicyConfig, PolicyDecision, PolicyEvaluation, PolicyRule, TimeWindow,
};

use crate::matcher::{compile_rule_patterns, matches_rule};
use crate::presets::preset_rules;
use crate::rate_limit::RateLimiter;

/// The timezone a rule's window is interpreted in.
enum RuleTz {
    /// No timezone given: the system timezone.
    System,
    Utc,
    Fixed(FixedOffset),
}

struct CompiledRule {
    rule: PolicyRule,
    patterns: Option<Vec<Regex>>,
    tz: RuleTz,
}

/// The policy evaluation engine. Construction validates the whole
/// bundle; a single bad pattern rejects the configuration.
pub struct PolicyEngine {
    config: PolicyConfig,
    rules: Vec<CompiledRule>,
    entity_id: String,
    limiter: Arc<RateLimiter>,
}

impl PolicyEngine {
    /// Compiles and validates a policy bundle.
    pub fn new(config: PolicyConfig, limiter: Arc<RateLimiter>) -> WardenResult<Self> {
        let mut rules: Vec<PolicyRule> = match &config.preset {
            Some(preset) => preset_rules(preset)?,
            None => Vec::new(),
        };
        rules.extend(config.rules.iter().cloned());

        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let patterns = compile_rule_patterns(&rule.match_spec)?;
            let tz = match &rule.match_spec.time_window {
                Some(window) => Self::validate_window(&rule.id, window)?,
                None => RuleTz::System,
            };
            compiled.push(CompiledRule { rule, patterns, tz });
        }
        // Stable sort keeps insertion order within equal priorities.
        compiled.sort_by_key(|c| c.rule.priority);

        let entity_id = Self::entity_id_for(&config, &compiled)?;
        debug!(
            policy = %entity_id,
            rules = compiled.len(),
            enforce = config.enforce,
            "Policy bundle loaded"
        );

        Ok(Self {
            config,
            rules: compiled,
            entity_id,
            limiter,
        })
    }

    fn validate_window(rule_id: &str, window: &TimeWindow) -> WardenResult<RuleTz> {
        if let Some([start, end]) = window.allowed_hours {
            if start > 23 || end > 24 {
                return Err(WardenError::ConfigInvalid(format!(
                    "rule '{rule_id}': allowedHours [{start}, {end}] out of range"
                )));
            }
        }
        if let Some(days) = &window.allowed_days {
            if days.iter().any(|d| *d > 6) {
                return Err(WardenError::ConfigInvalid(format!(
                    "rule '{rule_id}': allowedDays must use 0 (Sunday) through 6 (Saturday)"
                )));
            }
        }
        match window.timezone.as_deref() {
            None => Ok(RuleTz::System),
            Some("local") => Ok(RuleTz::System),
            Some("utc") | Some("UTC") => Ok(RuleTz::Utc),
            Some(offset) => offset
                .parse::<FixedOffset>()
                .map(RuleTz::Fixed)
                .map_err(|_| {
                    WardenError::ConfigInvalid(format!(
                        "rule '{rule_id}': timezone '{offset}' is not utc, local, or a \
                         fixed offset like +05:30"
                    ))
                }),
        }
    }

    /// `policy:<name>:<version>:<sha256-hex>` over the canonical JSON of
    /// the effective (preset + custom) rule list.
    fn entity_id_for(config: &PolicyConfig, rules: &[CompiledRule]) -> WardenResult<String> {
        let effective: Vec<&PolicyRule> = rules.iter().map(|c| &c.rule).collect();
        let bytes = canonical_json_bytes(&effective)?;
        Ok(format!(
            "policy:{}:{}:{}",
            config.name,
            config.version,
            sha256_hex(&bytes)
        ))
    }

    /// The content-addressed identifier of this bundle.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The configuration this engine was built from.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// The rate limiter backing rate-limit clauses.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Evaluates a tool call at the current instant.
    pub fn evaluate(
        &self,
        tool: &str,
        category: ToolCategory,
        target: Option<&str>,
    ) -> PolicyEvaluation {
        self.evaluate_at(tool, category, target, Utc::now())
    }

    /// Evaluates a tool call against an explicit clock.
    pub fn evaluate_at(
        &self,
        tool: &str,
        category: ToolCategory,
        target: Option<&str>,
        now: DateTime<Utc>,
    ) -> PolicyEvaluation {
        let now_ms = now.timestamp_millis();
        let mut admitted_rate_keys = Vec::new();

        for compiled in &self.rules {
            let rule = &compiled.rule;
            if !matches_rule(
                tool,
                category,
                target,
                &rule.match_spec,
                compiled.patterns.as_deref(),
            ) {
                continue;
            }

            let mut constraints = vec![format!("ruleId={}", rule.id)];

            if let Some(window) = &rule.match_spec.time_window {
                if !Self::in_window(window, &compiled.tz, now) {
                    continue;
                }
                if let Some([start, end]) = window.allowed_hours {
                    constraints.push(format!("window=[{start},{end})"));
                }
            }

            let mut exceeded_rate_key = None;
            if let Some(limit) = &rule.match_spec.rate_limit {
                let key = Self::rate_key(rule, tool, category);
                let check = self
                    .limiter
                    .check_at(&key, limit.max_count, limit.window_ms, now_ms);
                if check.allowed {
                    // Window still has room: the clause does not match,
                    // but the key must be recorded if the call runs.
                    admitted_rate_keys.push(key);
                    continue;
                }
                constraints.push(format!("rateKey={key}"));
                constraints.push(format!(
                    "rateLimit={}/{}ms",
                    limit.max_count, limit.window_ms
                ));
                exceeded_rate_key = Some(key);
            }

            let enforced = self.config.enforce || rule.decision != PolicyDecision::Deny;
            let reason = rule
                .reason
                .clone()
                .unwrap_or_else(|| format!("Matched rule: {}", rule.name));
            debug!(
                tool,
                category = %category,
                rule = %rule.id,
                decision = %rule.decision,
                enforced,
                "Policy decision"
            );
            return PolicyEvaluation {
                decision: rule.decision,
                matched_rule: Some(rule.id.clone()),
                enforced,
                reason,
                constraints,
                admitted_rate_keys,
                exceeded_rate_key,
            };
        }

        let decision = self.config.default_policy;
        let enforced = self.config.enforce || decision != PolicyDecision::Deny;
        debug!(tool, category = %category, decision = %decision, "Default policy decision");
        PolicyEvaluation {
            decision,
            matched_rule: None,
            enforced,
            reason: format!("Default policy: {decision}"),
            constraints: vec![format!("defaultPolicy={decision}")],
            admitted_rate_keys,
            exceeded_rate_key: None,
        }
    }

    fn in_window(window: &TimeWindow, tz: &RuleTz, now: DateTime<Utc>) -> bool {
        let (hour, weekday) = match tz {
            RuleTz::System => {
                let local = now.with_timezone(&Local);
                (local.hour(), local.weekday().num_days_from_sunday())
            }
            RuleTz::Utc => (now.hour(), now.weekday().num_days_from_sunday()),
            RuleTz::Fixed(offset) => {
                let shifted = now.with_timezone(offset);
                (shifted.hour(), shifted.weekday().num_days_from_sunday())
            }
        };

        if let Some([start, end]) = window.allowed_hours {
            let inside = if start <= end {
                hour >= start && hour < end
            } else {
                // Wraps past midnight, e.g. [22, 6).
                hour >= start || hour < end
            };
            if !inside {
                return false;
            }
        }
        if let Some(days) = &window.allowed_days {
            if !days.contains(&weekday) {
                return false;
            }
        }
        true
    }

    /// Canonical rate key for a rule in the context of one call.
    fn rate_key(rule: &PolicyRule, tool: &str, category: ToolCategory) -> String {
        if rule.match_spec.tools.is_some() {
            format!("ratelimit:{}:tool:{}", rule.id, tool)
        } else if rule.match_spec.categories.is_some() {
            format!("ratelimit:{}:category:{}", rule.id, category)
        } else {
            format!("ratelimit:{}:global", rule.id)
        }
    }
}
