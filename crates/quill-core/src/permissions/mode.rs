//! Permission modes and the tool access catalog.

use serde::{Deserialize, Serialize};

/// Permission mode for tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Reads run freely; writes pause for confirmation.
    #[default]
    Default,
    /// Read-only research and planning; writes are blocked.
    Plan,
    /// Writes run without confirmation prompts.
    AcceptEdits,
    /// Everything runs without gating.
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "accept_edits",
            PermissionMode::BypassPermissions => "bypass_permissions",
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access category for permission checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAccess {
    /// Never modifies state.
    ReadOnly,
    /// Modifies the article, files, or external state.
    Write,
    /// Drives the permission lifecycle itself.
    Control,
}

/// Categorize a tool by name. Unknown tools are treated as writes.
pub fn tool_access(name: &str) -> ToolAccess {
    match name {
        "read_article" | "read_file" | "search_files" | "web_search" | "web_fetch"
        | "get_outline" | "todo_read" => ToolAccess::ReadOnly,
        "exit_plan_mode" => ToolAccess::Control,
        _ => ToolAccess::Write,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog() {
        assert_eq!(tool_access("read_article"), ToolAccess::ReadOnly);
        assert_eq!(tool_access("web_search"), ToolAccess::ReadOnly);
        assert_eq!(tool_access("edit_article"), ToolAccess::Write);
        assert_eq!(tool_access("shell"), ToolAccess::Write);
        assert_eq!(tool_access("exit_plan_mode"), ToolAccess::Control);
    }

    #[test]
    fn test_unknown_tools_are_writes() {
        assert_eq!(tool_access("brand_new_tool"), ToolAccess::Write);
    }

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&PermissionMode::AcceptEdits).unwrap(),
            "\"accept_edits\""
        );
        let mode: PermissionMode = serde_json::from_str("\"bypass_permissions\"").unwrap();
        assert_eq!(mode, PermissionMode::BypassPermissions);
        assert_eq!(PermissionMode::default(), PermissionMode::Default);
    }
}
