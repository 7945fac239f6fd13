//! Tool interception.
//!
//! Every tool call the engine dispatches passes through here:
//! permission check, security validation, the `exit_plan_mode` special
//! case, user confirmation where required, then execution through the
//! registry. Denials are structured results with a reminder attached;
//! nothing on this path returns an error.

use std::sync::Arc;

use serde_json::Value;

use crate::queue::ToolCall;
use crate::security::{SecurityRequest, SecurityValidator};
use crate::tools::{ToolExecutionResult, ToolInvocationContext, ToolRegistry};

use super::confirmation::{ConfirmationOutcome, PermissionConfirmationService};
use super::manager::PermissionManager;
use super::mode::PermissionMode;
use super::plan_mode::PlanModeManager;
use super::reminders::SystemReminder;

/// Outcome of intercepting one tool call.
#[derive(Debug)]
pub enum InterceptionResult {
    /// The call never ran: permission denial, security denial, or a
    /// declined confirmation.
    Blocked {
        reason: String,
        reminder: SystemReminder,
    },
    /// The call ran (successfully or not).
    Executed {
        result: ToolExecutionResult,
        reminder: Option<SystemReminder>,
        /// Set when the call changed the permission mode (plan exit).
        mode_changed: Option<PermissionMode>,
    },
}

impl InterceptionResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, InterceptionResult::Blocked { .. })
    }

    pub fn succeeded(&self) -> bool {
        matches!(
            self,
            InterceptionResult::Executed { result, .. } if result.success
        )
    }
}

/// The mandatory gate in front of tool execution.
pub struct ToolInterceptor {
    permissions: Arc<PermissionManager>,
    plan_mode: Arc<PlanModeManager>,
    validator: Arc<SecurityValidator>,
    registry: Arc<ToolRegistry>,
    confirmations: Arc<PermissionConfirmationService>,
    /// Stop batch interception at the first blocked call.
    strict: bool,
}

impl ToolInterceptor {
    pub fn new(
        permissions: Arc<PermissionManager>,
        plan_mode: Arc<PlanModeManager>,
        validator: Arc<SecurityValidator>,
        registry: Arc<ToolRegistry>,
        confirmations: Arc<PermissionConfirmationService>,
        strict: bool,
    ) -> Self {
        Self {
            permissions,
            plan_mode,
            validator,
            registry,
            confirmations,
            strict,
        }
    }

    /// Run one tool call through the full gate.
    pub async fn intercept_tool_call(
        &self,
        call: &ToolCall,
        ctx: &ToolInvocationContext,
    ) -> InterceptionResult {
        // 1. Mode permission.
        let decision = self.permissions.check_tool_permission(&call.name);
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| format!("tool '{}' is not permitted", call.name));
            tracing::info!(tool = %call.name, reason = %reason, "tool call blocked by mode");
            return InterceptionResult::Blocked {
                reminder: SystemReminder::plan_mode_block(&call.name),
                reason,
            };
        }

        // 2. Security validation. Bypass mode skips the pipeline entirely.
        if self.permissions.mode() != PermissionMode::BypassPermissions {
            let request =
                SecurityRequest::tool_execution(&call.name, call.input.clone(), "agent");
            let response = self.validator.validate(&request);
            if !response.allowed {
                let descriptions: Vec<String> = response
                    .risks
                    .iter()
                    .map(|r| r.description.clone())
                    .collect();
                let reason = format!(
                    "tool '{}' blocked by security policy: {}",
                    call.name,
                    descriptions.join("; ")
                );
                tracing::warn!(tool = %call.name, risks = response.risks.len(), "tool call denied by security pipeline");
                return InterceptionResult::Blocked {
                    reminder: SystemReminder::security_block(&call.name, &descriptions),
                    reason,
                };
            }
        }

        // 3. Plan exit is handled here, not by the registry.
        if call.name == "exit_plan_mode" {
            return self.handle_plan_exit(call);
        }

        // 4. Confirmation for ungranted writes.
        if self.permissions.requires_confirmation(&call.name) {
            let file_path = extract_file_path(&call.input);
            let outcome = self
                .confirmations
                .request(
                    &call.name,
                    file_path,
                    format!("Allow '{}' to run?", call.name),
                    Some(call.input.clone()),
                )
                .await;

            match outcome {
                ConfirmationOutcome::AllowedForSession => {
                    self.permissions.grant_for_session(&call.name);
                }
                ConfirmationOutcome::Allowed => {}
                ConfirmationOutcome::Denied | ConfirmationOutcome::TimedOut => {
                    let timed_out = outcome == ConfirmationOutcome::TimedOut;
                    return InterceptionResult::Blocked {
                        reason: format!(
                            "tool '{}' was not confirmed ({})",
                            call.name,
                            if timed_out { "timed out" } else { "denied" }
                        ),
                        reminder: SystemReminder::confirmation_denied(&call.name, timed_out),
                    };
                }
            }
        }

        // 5. Execute.
        let result = self
            .registry
            .execute(&call.name, call.input.clone(), ctx)
            .await;

        InterceptionResult::Executed {
            result,
            reminder: None,
            mode_changed: None,
        }
    }

    fn handle_plan_exit(&self, call: &ToolCall) -> InterceptionResult {
        let plan = call
            .input
            .get("plan")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let exit = self.plan_mode.exit_plan_mode(plan);
        if exit.approved {
            InterceptionResult::Executed {
                result: ToolExecutionResult::success(exit.reason),
                reminder: Some(SystemReminder::mode_changed(
                    PermissionMode::Plan.as_str(),
                    exit.mode.as_str(),
                )),
                mode_changed: Some(exit.mode),
            }
        } else {
            InterceptionResult::Executed {
                result: ToolExecutionResult::failure(exit.reason),
                reminder: None,
                mode_changed: None,
            }
        }
    }

    /// Intercept a batch sequentially. In strict mode the first blocked
    /// call ends the batch; later calls never run.
    pub async fn intercept_batch(
        &self,
        calls: &[ToolCall],
        ctx: &ToolInvocationContext,
    ) -> Vec<InterceptionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.intercept_tool_call(call, ctx).await;
            let blocked = result.is_blocked();
            results.push(result);
            if blocked && self.strict {
                tracing::info!(
                    completed = results.len(),
                    total = calls.len(),
                    "strict batch stopped at blocked call"
                );
                break;
            }
        }
        results
    }
}

fn extract_file_path(input: &Value) -> Option<String> {
    ["path", "file_path", "file"]
        .iter()
        .find_map(|key| input.get(key).and_then(Value::as_str))
        .map(String::from)
}
