//! Plan mode lifecycle.
//!
//! Owns the permission mode cell and the append-only history of approved
//! plans. Every mode transition in the system goes through this manager,
//! so the engine and the interceptor always agree on the current mode.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::mode::PermissionMode;

/// Verdict on a plan submitted through `exit_plan_mode`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanExitResult {
    pub approved: bool,
    pub reason: String,
    /// Mode in effect after the call.
    pub mode: PermissionMode,
}

/// An approved plan. Rejected plans are not recorded.
#[derive(Debug, Clone, Serialize)]
pub struct PlanRecord {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub approved_at: DateTime<Utc>,
}

/// Owns mode transitions and the plan history.
pub struct PlanModeManager {
    mode: RwLock<PermissionMode>,
    history: RwLock<Vec<PlanRecord>>,
}

impl Default for PlanModeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanModeManager {
    pub fn new() -> Self {
        Self {
            mode: RwLock::new(PermissionMode::Default),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn current_mode(&self) -> PermissionMode {
        *self.mode.read()
    }

    pub fn is_in_plan_mode(&self) -> bool {
        self.current_mode() == PermissionMode::Plan
    }

    /// Enter plan mode. Returns false when already in it.
    pub fn enter_plan_mode(&self) -> bool {
        let mut mode = self.mode.write();
        if *mode == PermissionMode::Plan {
            return false;
        }
        tracing::info!(previous = %*mode, "entering plan mode");
        *mode = PermissionMode::Plan;
        true
    }

    /// Set the mode directly (default, accept-edits, bypass). Returns the
    /// previous mode.
    pub fn set_mode(&self, new_mode: PermissionMode) -> PermissionMode {
        let mut mode = self.mode.write();
        let previous = *mode;
        if previous != new_mode {
            tracing::info!(from = %previous, to = %new_mode, "permission mode changed");
        }
        *mode = new_mode;
        previous
    }

    /// Validate a plan; on approval, record it and transition back to the
    /// default mode. Rejection keeps plan mode so the plan can be fixed.
    pub fn exit_plan_mode(&self, plan: &str) -> PlanExitResult {
        let mut mode = self.mode.write();
        if *mode != PermissionMode::Plan {
            return PlanExitResult {
                approved: false,
                reason: "not in plan mode".to_string(),
                mode: *mode,
            };
        }

        match validate_plan(plan) {
            Err(reason) => {
                tracing::info!(reason = %reason, "plan rejected");
                PlanExitResult {
                    approved: false,
                    reason,
                    mode: PermissionMode::Plan,
                }
            }
            Ok(title) => {
                self.history.write().push(PlanRecord {
                    id: Uuid::new_v4(),
                    title,
                    content: plan.to_string(),
                    approved_at: Utc::now(),
                });
                *mode = PermissionMode::Default;
                tracing::info!("plan approved, returning to default mode");
                PlanExitResult {
                    approved: true,
                    reason: "plan approved".to_string(),
                    mode: PermissionMode::Default,
                }
            }
        }
    }

    pub fn plan_history(&self) -> Vec<PlanRecord> {
        self.history.read().clone()
    }
}

fn is_step_line(line: &str) -> bool {
    line.starts_with('-')
        || line.starts_with('*')
        || line.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// A plan is well formed when it is non-empty and contains at least one
/// step-like line. The first line doubles as the title.
fn validate_plan(plan: &str) -> Result<String, String> {
    let lines: Vec<&str> = plan
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Err("plan is empty".to_string());
    }
    if !lines.iter().any(|line| is_step_line(line)) {
        return Err("plan needs at least one step line ('1.', '-', or '*')".to_string());
    }

    let title = lines[0].trim_start_matches('#').trim();
    Ok(if title.is_empty() {
        "Untitled plan".to_string()
    } else {
        title.to_string()
    })
}
