//! Tool permission decisions.
//!
//! Pure mode-plus-catalog policy: no IO, no waiting. The confirmation
//! pause itself lives in the confirmation service; this manager only
//! answers "is it allowed" and "does it need sign-off".

use std::sync::Arc;

use dashmap::DashSet;
use serde::Serialize;

use super::mode::{tool_access, PermissionMode, ToolAccess};
use super::plan_mode::PlanModeManager;

/// Outcome of a permission check.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PermissionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Mode-aware permission policy with per-session grants.
pub struct PermissionManager {
    plan_mode: Arc<PlanModeManager>,
    session_grants: DashSet<String>,
}

impl PermissionManager {
    pub fn new(plan_mode: Arc<PlanModeManager>) -> Self {
        Self {
            plan_mode,
            session_grants: DashSet::new(),
        }
    }

    pub fn mode(&self) -> PermissionMode {
        self.plan_mode.current_mode()
    }

    /// Check whether a tool may run in the current mode.
    pub fn check_tool_permission(&self, name: &str) -> PermissionDecision {
        match self.plan_mode.current_mode() {
            PermissionMode::Default
            | PermissionMode::AcceptEdits
            | PermissionMode::BypassPermissions => PermissionDecision::allow(),
            PermissionMode::Plan => match tool_access(name) {
                ToolAccess::ReadOnly | ToolAccess::Control => PermissionDecision::allow(),
                ToolAccess::Write => PermissionDecision::deny(format!(
                    "tool '{}' modifies state and is blocked in plan mode; present a plan with exit_plan_mode first",
                    name
                )),
            },
        }
    }

    /// Whether execution must pause for user confirmation. Only write
    /// tools in the default mode need it, and a session grant waives it.
    pub fn requires_confirmation(&self, name: &str) -> bool {
        match self.plan_mode.current_mode() {
            PermissionMode::Plan
            | PermissionMode::AcceptEdits
            | PermissionMode::BypassPermissions => false,
            PermissionMode::Default => {
                tool_access(name) == ToolAccess::Write && !self.session_grants.contains(name)
            }
        }
    }

    /// Remember an allow-for-session decision.
    pub fn grant_for_session(&self, name: &str) {
        tracing::info!(tool = name, "session grant recorded");
        self.session_grants.insert(name.to_string());
    }

    pub fn has_session_grant(&self, name: &str) -> bool {
        self.session_grants.contains(name)
    }

    pub fn clear_session_grants(&self) {
        self.session_grants.clear();
    }
}
