//! Tool call classification: category, sensitivity, and target extraction.
//!
//! Tool parameters arrive as an untyped JSON bag. The classifier inspects
//! well-known keys (`file_path`, `path`, `pattern`, `command`, `url`,
//! `prompt`) to pull out a primary target and a secondary target list,
//! recognizes credential-bearing and agent-memory paths, and escalates
//! `file_read`/`file_write` calls on credential paths to
//! `credential_access`.

use regex_lite::Regex;
use serde_json::Value;
use warden_types::category::ToolCategory;

/// Parameter keys tried, in order, for the primary target.
const PRIMARY_KEYS: &[&str] = &["file_path", "path", "pattern", "command", "url"];

/// Parameter keys treated as direct path-like values for the secondary list.
const PATH_KEYS: &[&str] = &["file_path", "path", "notebook_path"];

/// Commands longer than this are truncated in the primary target.
const COMMAND_TRUNCATE_LEN: usize = 80;

/// Path prefixes excluded from absolute-path extraction.
const EXCLUDED_PREFIXES: &[&str] = &["/dev/", "/proc/", "/sys/"];

/// What the classifier learned about one tool call.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Category after any credential escalation.
    pub category: ToolCategory,
    /// Primary target, if any parameter yielded one.
    pub target: Option<String>,
    /// Secondary targets, present only when they add information beyond
    /// the primary target.
    pub targets: Option<Vec<String>>,
    /// Targets that matched a credential pattern.
    pub credential_hits: Vec<String>,
    /// Targets that matched an agent-memory pattern.
    pub memory_hits: Vec<String>,
}

/// Recognizes categories and sensitive paths in tool calls.
pub struct Classifier {
    credential_patterns: Vec<Regex>,
    memory_patterns: Vec<Regex>,
    absolute_path: Regex,
    relative_path: Regex,
    home_path: Regex,
    quoted_path: Regex,
}

impl Classifier {
    /// Builds a classifier with the built-in sensitivity patterns.
    pub fn new() -> Self {
        let re = |s: &str| Regex::new(s).expect("built-in regex");
        Self {
            credential_patterns: vec![
                re(r"(?i)(^|/)\.env(\.[^/]*)?$"),
                re(r"(?i)(^|/)credentials\.[^/]*$"),
                re(r"(?i)(^|/)secrets?\.[^/]*$"),
                re(r"(?i)\.aws/credentials$"),
                re(r"(?i)\.ssh/id_[^/]*$"),
                re(r"(?i)\.ssh/known_hosts$"),
                re(r"(?i)(^|/)\.netrc$"),
                re(r"(?i)(^|/)\.pgpass$"),
                re(r"(?i)(^|/)\.npmrc$"),
                re(r"(?i)(^|/)\.pypirc$"),
                re(r"(?i)(^|/)token[^/]*\.json$"),
                re(r"(?i)(^|/)auth[^/]*\.json$"),
                re(r"(?i)(^|/)apikey[^/]*$"),
            ],
            memory_patterns: vec![
                re(r"(?i)(^|/)memory\.md$"),
                re(r"/memory/[^/]+\.md$"),
                re(r"\.(moltbot|clawdbot|openclaw)/.*memory"),
            ],
            absolute_path: re(r#"(^|\s)(/[^\s;|&<>'"]+)"#),
            relative_path: re(r#"(\.{0,2}/[^\s;|&<>'"]+\.[A-Za-z0-9]+)"#),
            home_path: re(r#"(^|\s)(~/[^\s;|&<>'"]+)"#),
            quoted_path: re(r#"["'`]([/~][^"'`]+)["'`]"#),
        }
    }

    /// Classifies a tool call from its name and parameter bag.
    pub fn classify(&self, tool: &str, params: &Value) -> Classification {
        let base = ToolCategory::from_tool_name(tool);
        let (target, primary_key) = self.primary_target(params);
        let secondary = self.secondary_targets(tool, params);

        // Sensitivity scanning covers path-valued targets: the primary
        // when it came from a path-like key (not raw command/prompt
        // text), plus everything the secondary extraction found.
        let mut scan: Vec<String> = Vec::new();
        if let (Some(t), Some(key)) = (&target, primary_key) {
            if key != "command" {
                scan.push(t.clone());
            }
        }
        for t in &secondary {
            if !scan.contains(t) {
                scan.push(t.clone());
            }
        }

        let credential_hits: Vec<String> = scan
            .iter()
            .filter(|t| self.is_credential_path(t))
            .cloned()
            .collect();
        let memory_hits: Vec<String> = scan
            .iter()
            .filter(|t| self.is_memory_path(t))
            .cloned()
            .collect();

        let category = match base {
            ToolCategory::FileRead | ToolCategory::FileWrite if !credential_hits.is_empty() => {
                ToolCategory::CredentialAccess
            }
            other => other,
        };

        // Emit the secondary list only when it says more than {primary}.
        let targets = match (&target, secondary.is_empty()) {
            (_, true) => None,
            (Some(primary), false) if secondary == [primary.clone()] => None,
            _ => Some(secondary),
        };

        Classification {
            category,
            target,
            targets,
            credential_hits,
            memory_hits,
        }
    }

    /// Whether a target matches any credential pattern.
    pub fn is_credential_path(&self, target: &str) -> bool {
        self.credential_patterns.iter().any(|p| p.is_match(target))
    }

    /// Whether a target matches any agent-memory pattern.
    pub fn is_memory_path(&self, target: &str) -> bool {
        self.memory_patterns.iter().any(|p| p.is_match(target))
    }

    fn primary_target(&self, params: &Value) -> (Option<String>, Option<&'static str>) {
        for &key in PRIMARY_KEYS {
            if let Some(value) = params.get(key).and_then(Value::as_str) {
                if key == "command" && value.chars().count() > COMMAND_TRUNCATE_LEN {
                    let truncated: String = value.chars().take(COMMAND_TRUNCATE_LEN).collect();
                    return (Some(format!("{truncated}…")), Some(key));
                }
                return (Some(value.to_string()), Some(key));
            }
        }
        (None, None)
    }

    fn secondary_targets(&self, tool: &str, params: &Value) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        let mut push = |t: String| {
            if !targets.contains(&t) {
                targets.push(t);
            }
        };

        for key in PATH_KEYS {
            if let Some(value) = params.get(key).and_then(Value::as_str) {
                push(value.to_string());
            }
        }

        if tool == "Bash" {
            if let Some(command) = params.get("command").and_then(Value::as_str) {
                for path in self.extract_paths(command, false) {
                    push(path);
                }
            }
        }
        if tool == "Task" {
            if let Some(prompt) = params.get("prompt").and_then(Value::as_str) {
                for path in self.extract_paths(prompt, true) {
                    push(path);
                }
            }
        }

        targets
    }

    /// Pulls filesystem paths out of free text (a shell command or a
    /// sub-agent prompt).
    fn extract_paths(&self, text: &str, include_quoted: bool) -> Vec<String> {
        let mut paths = Vec::new();
        let mut push = |p: &str| {
            let p = p.to_string();
            if !paths.contains(&p) {
                paths.push(p);
            }
        };

        for caps in self.absolute_path.captures_iter(text) {
            if let Some(m) = caps.get(2) {
                let path = m.as_str();
                if !EXCLUDED_PREFIXES.iter().any(|pre| path.starts_with(pre)) {
                    push(path);
                }
            }
        }
        for caps in self.relative_path.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                push(m.as_str());
            }
        }
        for caps in self.home_path.captures_iter(text) {
            if let Some(m) = caps.get(2) {
                push(m.as_str());
            }
        }
        if include_quoted {
            for caps in self.quoted_path.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    push(m.as_str());
                }
            }
        }
        paths
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
