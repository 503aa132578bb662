//! Glob and regex matching for policy rule criteria.
//!
//! Target patterns are globs by default: `?` matches one non-`/`
//! character, `*` a run of non-`/` characters, and `**` any run
//! including separators (absorbing one trailing `/` so `a/**/b` matches
//! `a/b`). Converted patterns are anchored: a glob matches the whole
//! target string, never a substring.
//!
//! Rules may opt into raw regexes instead. Those are screened by
//! [`validate_regex_pattern`] before compilation so that a hostile
//! pattern cannot be smuggled into a policy bundle and later fed to a
//! less forgiving engine.

use regex_lite::Regex;
use warden_types::category::ToolCategory;
use warden_types::error::{WardenError, WardenResult};
use warden_types::policy::RuleMatch;

/// Maximum accepted length for a raw regex pattern.
pub const MAX_REGEX_PATTERN_LEN: usize = 500;

/// Characters escaped during glob conversion.
const REGEX_META: &[char] = &['.', '+', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\'];

/// Converts a glob pattern into an anchored regex string.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    // `**/` also matches the empty prefix
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c if REGEX_META.contains(&c) => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.push('$');
    out
}

/// Compiles a glob pattern into a matcher.
pub fn compile_glob(pattern: &str) -> WardenResult<Regex> {
    let source = glob_to_regex(pattern);
    Regex::new(&source)
        .map_err(|e| WardenError::ConfigInvalid(format!("glob '{pattern}' did not compile: {e}")))
}

/// Screens a raw regex pattern for shapes with catastrophic backtracking
/// potential, then checks that it compiles.
///
/// Rejected shapes:
/// - nested quantifiers: `(a*)+`, `(a+)+`, `(a+)*`, `(a+){2,5}`
/// - overlapping alternation under a quantifier: `(.*|x)+`, `(.+|x)+`
/// - chained interval quantifiers: `a{1,10}{1,10}`
/// - patterns longer than [`MAX_REGEX_PATTERN_LEN`] characters
pub fn validate_regex_pattern(pattern: &str) -> WardenResult<()> {
    if pattern.len() > MAX_REGEX_PATTERN_LEN {
        return Err(WardenError::ConfigInvalid(format!(
            "regex pattern exceeds {MAX_REGEX_PATTERN_LEN} characters"
        )));
    }

    let nested_quantifier = Regex::new(r"\([^()]*[*+]\)(?:[*+]|\{)").expect("built-in regex");
    if nested_quantifier.is_match(pattern) {
        return Err(WardenError::ConfigInvalid(format!(
            "regex pattern '{pattern}' nests a quantifier inside a quantified group"
        )));
    }

    let overlapping_alternation =
        Regex::new(r"\(\.[*+]\|[^)]*\)(?:[*+]|\{)").expect("built-in regex");
    if overlapping_alternation.is_match(pattern) {
        return Err(WardenError::ConfigInvalid(format!(
            "regex pattern '{pattern}' quantifies an alternation with an overlapping wildcard"
        )));
    }

    let chained_quantifier = Regex::new(r"\{[0-9]+(?:,[0-9]*)?\}\{").expect("built-in regex");
    if chained_quantifier.is_match(pattern) {
        return Err(WardenError::ConfigInvalid(format!(
            "regex pattern '{pattern}' chains interval quantifiers"
        )));
    }

    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| WardenError::ConfigInvalid(format!("regex '{pattern}' did not compile: {e}")))
}

/// Compiles a rule's target patterns, globs or validated raw regexes.
///
/// Returns `None` when the rule has no target patterns.
pub fn compile_rule_patterns(spec: &RuleMatch) -> WardenResult<Option<Vec<Regex>>> {
    let patterns = match &spec.target_patterns {
        Some(p) => p,
        None => return Ok(None),
    };
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        if spec.target_patterns_are_regex {
            validate_regex_pattern(pattern)?;
            compiled.push(Regex::new(pattern).map_err(|e| {
                WardenError::ConfigInvalid(format!("regex '{pattern}' did not compile: {e}"))
            })?);
        } else {
            compiled.push(compile_glob(pattern)?);
        }
    }
    Ok(Some(compiled))
}

/// Checks a rule's static criteria against a tool call. Present criteria
/// are AND-combined; an empty match block matches everything.
///
/// Time windows and rate limits are dynamic criteria and are checked by
/// the engine, not here.
pub fn matches_rule(
    tool: &str,
    category: ToolCategory,
    target: Option<&str>,
    spec: &RuleMatch,
    patterns: Option<&[Regex]>,
) -> bool {
    if let Some(tools) = &spec.tools {
        if !tools.iter().any(|t| t == tool) {
            return false;
        }
    }
    if let Some(categories) = &spec.categories {
        if !categories.contains(&category) {
            return false;
        }
    }
    if let Some(patterns) = patterns {
        let target = match target {
            Some(t) => t,
            None => return false,
        };
        if !patterns.iter().any(|p| p.is_match(target)) {
            return false;
        }
    }
    true
}
