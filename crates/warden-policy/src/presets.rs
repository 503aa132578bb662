//! Named policy rule bundles.
//!
//! Four presets ship with the engine. `permissive` renders every call
//! allowed; `safety` blocks destructive shell commands and secret-file
//! access while warning on memory writes and network use; `strict`
//! denies everything except read-shaped tools; `audit-only` carries the
//! `safety` rules without enforcement.
//!
//! Command-matching contracts, documented here because operators depend
//! on them:
//! - [`DENY_RM_REGEX`]: `rm` followed by any flag argument (`rm -rf x`,
//!   `rm -f x`) is denied.
//! - [`WARN_RM_REGEX`]: bare `rm <path>` with no flags is warned.
//! - [`DENY_MKFS_REGEX`]: anything starting `mkfs.` is denied.

use warden_types::category::ToolCategory;
use warden_types::error::{WardenError, WardenResult};
use warden_types::policy::{PolicyConfig, PolicyDecision, PolicyRule, RuleMatch};

/// Flagged `rm` invocations, e.g. `rm -rf /` or `rm --force x`.
pub const DENY_RM_REGEX: &str = r"^rm\s+-\S+";
/// Filesystem creation commands, e.g. `mkfs.ext4 /dev/sda1`.
pub const DENY_MKFS_REGEX: &str = r"^mkfs\.";
/// Plain `rm <path>` with no flags.
pub const WARN_RM_REGEX: &str = r"^rm\s+[^-\s]";

/// Glob patterns recognizing credential-bearing paths.
pub const CREDENTIAL_GLOBS: &[&str] = &[
    "**/.env",
    "**/.env.*",
    "**/credentials.*",
    "**/secret.*",
    "**/secrets.*",
    "**/.aws/credentials",
    "**/.ssh/id_*",
    "**/.ssh/known_hosts",
    "**/.netrc",
    "**/.pgpass",
    "**/.npmrc",
    "**/.pypirc",
    "**/token*.json",
    "**/auth*.json",
    "**/apikey*",
];

/// Glob patterns recognizing agent-memory files.
pub const MEMORY_GLOBS: &[&str] = &["**/MEMORY.md", "**/memory.md", "**/memory/*.md"];

fn rule(
    id: &str,
    name: &str,
    priority: i32,
    decision: PolicyDecision,
    reason: &str,
    match_spec: RuleMatch,
) -> PolicyRule {
    PolicyRule {
        id: id.to_string(),
        name: name.to_string(),
        priority,
        match_spec,
        decision,
        reason: Some(reason.to_string()),
    }
}

fn string_vec(items: &[&str]) -> Option<Vec<String>> {
    Some(items.iter().map(|s| s.to_string()).collect())
}

fn safety_rules() -> Vec<PolicyRule> {
    vec![
        rule(
            "deny-destructive-commands",
            "Deny destructive commands",
            1,
            PolicyDecision::Deny,
            "Destructive shell commands are blocked",
            RuleMatch {
                tools: string_vec(&["Bash"]),
                target_patterns: string_vec(&[DENY_RM_REGEX, DENY_MKFS_REGEX]),
                target_patterns_are_regex: true,
                ..Default::default()
            },
        ),
        rule(
            "warn-file-delete",
            "Warn on file deletion",
            2,
            PolicyDecision::Warn,
            "File deletion is flagged for review",
            RuleMatch {
                tools: string_vec(&["Bash"]),
                target_patterns: string_vec(&[WARN_RM_REGEX]),
                target_patterns_are_regex: true,
                ..Default::default()
            },
        ),
        rule(
            "deny-secret-files",
            "Deny secret file access",
            5,
            PolicyDecision::Deny,
            "Access to credential material is blocked",
            RuleMatch {
                categories: Some(vec![ToolCategory::CredentialAccess]),
                ..Default::default()
            },
        ),
        // Companion rule: criteria inside one rule AND-combine, so the
        // credential glob list lives in a second rule at the same
        // priority to get OR semantics.
        rule(
            "deny-secret-paths",
            "Deny secret paths",
            5,
            PolicyDecision::Deny,
            "Access to credential material is blocked",
            RuleMatch {
                target_patterns: string_vec(CREDENTIAL_GLOBS),
                ..Default::default()
            },
        ),
        rule(
            "warn-memory-write",
            "Warn on agent memory writes",
            10,
            PolicyDecision::Warn,
            "Writes to agent memory files are flagged",
            RuleMatch {
                categories: Some(vec![ToolCategory::FileWrite]),
                target_patterns: string_vec(MEMORY_GLOBS),
                ..Default::default()
            },
        ),
        rule(
            "warn-network",
            "Warn on network access",
            20,
            PolicyDecision::Warn,
            "Network access is flagged",
            RuleMatch {
                categories: Some(vec![ToolCategory::Network]),
                ..Default::default()
            },
        ),
    ]
}

fn strict_rules() -> Vec<PolicyRule> {
    vec![rule(
        "allow-read-tools",
        "Allow read-shaped tools",
        1,
        PolicyDecision::Allow,
        "Read-only tools are permitted",
        RuleMatch {
            tools: string_vec(&["Read", "Glob", "Grep", "TodoWrite"]),
            ..Default::default()
        },
    )]
}

/// The rules a preset injects ahead of any custom rules.
pub fn preset_rules(name: &str) -> WardenResult<Vec<PolicyRule>> {
    match name {
        "permissive" => Ok(Vec::new()),
        "safety" | "audit-only" => Ok(safety_rules()),
        "strict" => Ok(strict_rules()),
        other => Err(WardenError::ConfigInvalid(format!(
            "unknown preset '{other}' (expected permissive, safety, strict, or audit-only)"
        ))),
    }
}

/// The full recommended configuration for a preset.
pub fn resolve_preset(name: &str) -> WardenResult<PolicyConfig> {
    let (default_policy, enforce) = match name {
        "permissive" => (PolicyDecision::Allow, false),
        "safety" => (PolicyDecision::Allow, true),
        "strict" => (PolicyDecision::Deny, true),
        "audit-only" => (PolicyDecision::Allow, false),
        other => {
            return Err(WardenError::ConfigInvalid(format!(
                "unknown preset '{other}' (expected permissive, safety, strict, or audit-only)"
            )))
        }
    };
    Ok(PolicyConfig {
        name: name.to_string(),
        version: "1".to_string(),
        default_policy,
        enforce,
        rules: Vec::new(),
        preset: Some(name.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::validate_regex_pattern;

    #[test]
    fn test_all_presets_resolve() {
        for name in ["permissive", "safety", "strict", "audit-only"] {
            assert!(resolve_preset(name).is_ok());
            assert!(preset_rules(name).is_ok());
        }
    }

    #[test]
    fn test_unknown_preset_rejected() {
        assert!(resolve_preset("paranoid").is_err());
        assert!(preset_rules("paranoid").is_err());
    }

    #[test]
    fn test_safety_rule_order() {
        let rules = preset_rules("safety").unwrap();
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "deny-destructive-commands",
                "warn-file-delete",
                "deny-secret-files",
                "deny-secret-paths",
                "warn-memory-write",
                "warn-network",
            ]
        );
        let priorities: Vec<i32> = rules.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_command_regexes_pass_validation() {
        for pattern in [DENY_RM_REGEX, DENY_MKFS_REGEX, WARN_RM_REGEX] {
            assert!(validate_regex_pattern(pattern).is_ok());
        }
    }

    #[test]
    fn test_rm_contract() {
        let deny = regex_lite::Regex::new(DENY_RM_REGEX).unwrap();
        let warn = regex_lite::Regex::new(WARN_RM_REGEX).unwrap();

        assert!(deny.is_match("rm -rf /tmp"));
        assert!(deny.is_match("rm -f notes.txt"));
        assert!(!deny.is_match("rm notes.txt"));
        assert!(!deny.is_match("rmdir old"));

        assert!(warn.is_match("rm notes.txt"));
        assert!(!warn.is_match("rm -rf /tmp"));
    }
}
