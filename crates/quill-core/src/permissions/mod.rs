//! Mode-aware permission gating.
//!
//! Four operating modes (default, plan, accept-edits, bypass) gate which
//! tools may run and which need user sign-off. [`ToolInterceptor`] is the
//! single entry point: permission check, security validation, confirmation,
//! then execution. Mode transitions live in [`PlanModeManager`] only.

pub mod confirmation;
pub mod interceptor;
pub mod manager;
pub mod mode;
pub mod plan_mode;
pub mod reminders;

pub use confirmation::{
    ConfirmationDecision, ConfirmationOutcome, PermissionConfirmationService, PermissionRequest,
    DEFAULT_CONFIRMATION_TIMEOUT,
};
pub use interceptor::{InterceptionResult, ToolInterceptor};
pub use manager::{PermissionDecision, PermissionManager};
pub use mode::{tool_access, PermissionMode, ToolAccess};
pub use plan_mode::{PlanExitResult, PlanModeManager, PlanRecord};
pub use reminders::{ReminderCategory, ReminderPriority, SystemReminder};
