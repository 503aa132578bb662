//! Tool categorization.
//!
//! Every tool name maps to a base category; the classifier may later
//! escalate `file_read`/`file_write` to `credential_access` when the
//! target looks like secret material.

use serde::{Deserialize, Serialize};

/// The category of a tool call, as seen by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Reading files or searching their contents.
    FileRead,
    /// Writing or editing files.
    FileWrite,
    /// Access to credential-bearing paths (escalated from read/write).
    CredentialAccess,
    /// Shell command execution.
    Command,
    /// Outbound network fetches and searches.
    Network,
    /// Spawning sub-agents.
    Delegation,
    /// Agent-internal state management.
    State,
    /// MCP-server-provided tools.
    Mcp,
    /// Anything not recognized.
    Unknown,
}

impl ToolCategory {
    /// Maps a tool name to its base category.
    ///
    /// Unrecognized names map to `Unknown`; names with the `mcp__` prefix
    /// map to `Mcp` regardless of suffix.
    pub fn from_tool_name(tool: &str) -> Self {
        if tool.starts_with("mcp__") {
            return Self::Mcp;
        }
        match tool {
            "Read" | "Glob" | "Grep" => Self::FileRead,
            "Write" | "Edit" | "NotebookEdit" => Self::FileWrite,
            "Bash" => Self::Command,
            "WebFetch" | "WebSearch" => Self::Network,
            "Task" => Self::Delegation,
            "TodoWrite" => Self::State,
            _ => Self::Unknown,
        }
    }

    /// Returns the snake_case wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::CredentialAccess => "credential_access",
            Self::Command => "command",
            Self::Network => "network",
            Self::Delegation => "delegation",
            Self::State => "state",
            Self::Mcp => "mcp",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_mapping() {
        assert_eq!(ToolCategory::from_tool_name("Read"), ToolCategory::FileRead);
        assert_eq!(ToolCategory::from_tool_name("Grep"), ToolCategory::FileRead);
        assert_eq!(
            ToolCategory::from_tool_name("Write"),
            ToolCategory::FileWrite
        );
        assert_eq!(ToolCategory::from_tool_name("Bash"), ToolCategory::Command);
        assert_eq!(
            ToolCategory::from_tool_name("WebFetch"),
            ToolCategory::Network
        );
        assert_eq!(
            ToolCategory::from_tool_name("Task"),
            ToolCategory::Delegation
        );
        assert_eq!(
            ToolCategory::from_tool_name("TodoWrite"),
            ToolCategory::State
        );
    }

    #[test]
    fn test_mcp_prefix() {
        assert_eq!(
            ToolCategory::from_tool_name("mcp__github__create_issue"),
            ToolCategory::Mcp
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(
            ToolCategory::from_tool_name("SomethingNew"),
            ToolCategory::Unknown
        );
    }

    #[test]
    fn test_wire_name_roundtrip() {
        let json = serde_json::to_string(&ToolCategory::CredentialAccess).unwrap();
        assert_eq!(json, "\"credential_access\"");
        let back: ToolCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ToolCategory::CredentialAccess);
    }
}
