//! System reminders.
//!
//! Structured advisory blocks injected for the caller or the model when a
//! tool is blocked, a mode changes, or the engine detects trouble. The
//! rendered text is a plain bracketed block so it survives any transport.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How urgently a reminder should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderPriority {
    Info,
    Warning,
    Critical,
}

/// What a reminder is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderCategory {
    PlanMode,
    Security,
    Permission,
    ModeChange,
    Diagnostic,
}

/// A structured, priority-tagged advisory.
#[derive(Debug, Clone, Serialize)]
pub struct SystemReminder {
    pub content: String,
    pub priority: ReminderPriority,
    pub category: ReminderCategory,
    pub timestamp: DateTime<Utc>,
}

impl SystemReminder {
    pub fn new(
        content: impl Into<String>,
        priority: ReminderPriority,
        category: ReminderCategory,
    ) -> Self {
        Self {
            content: content.into(),
            priority,
            category,
            timestamp: Utc::now(),
        }
    }

    /// A write tool was blocked by plan mode.
    pub fn plan_mode_block(tool: &str) -> Self {
        Self::new(
            format!(
                "Tool '{}' is unavailable in plan mode. Only read-only research tools \
                 may run; present a plan through exit_plan_mode to resume edits.",
                tool
            ),
            ReminderPriority::Warning,
            ReminderCategory::PlanMode,
        )
    }

    /// A tool call was denied by the security pipeline.
    pub fn security_block(tool: &str, reasons: &[String]) -> Self {
        let detail = if reasons.is_empty() {
            "security policy".to_string()
        } else {
            reasons.join("; ")
        };
        Self::new(
            format!("Tool '{}' was blocked: {}", tool, detail),
            ReminderPriority::Critical,
            ReminderCategory::Security,
        )
    }

    /// The user declined (or never answered) a confirmation prompt.
    pub fn confirmation_denied(tool: &str, timed_out: bool) -> Self {
        let content = if timed_out {
            format!(
                "Tool '{}' was not confirmed within the timeout and did not run.",
                tool
            )
        } else {
            format!("Tool '{}' was declined by the user and did not run.", tool)
        };
        Self::new(content, ReminderPriority::Warning, ReminderCategory::Permission)
    }

    /// The permission mode changed (e.g. plan mode exit).
    pub fn mode_changed(from: &str, to: &str) -> Self {
        Self::new(
            format!(
                "Permission mode changed from {} to {}. Previously restricted tools \
                 may now be available.",
                from, to
            ),
            ReminderPriority::Info,
            ReminderCategory::ModeChange,
        )
    }

    /// Repeated identical tool failures were detected.
    pub fn repeated_failure(diagnostic: &str) -> Self {
        Self::new(
            diagnostic.to_string(),
            ReminderPriority::Warning,
            ReminderCategory::Diagnostic,
        )
    }

    /// Render as a bracketed block for injection into a prompt.
    pub fn render(&self) -> String {
        format!("[system reminder: {:?}] {}", self.category, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_mode_block_names_the_tool() {
        let reminder = SystemReminder::plan_mode_block("edit_article");
        assert_eq!(reminder.category, ReminderCategory::PlanMode);
        assert_eq!(reminder.priority, ReminderPriority::Warning);
        assert!(reminder.content.contains("edit_article"));
        assert!(reminder.content.contains("exit_plan_mode"));
    }

    #[test]
    fn test_security_block_joins_reasons() {
        let reminder = SystemReminder::security_block(
            "shell",
            &["blocked path".to_string(), "rate limited".to_string()],
        );
        assert_eq!(reminder.priority, ReminderPriority::Critical);
        assert!(reminder.content.contains("blocked path; rate limited"));

        let bare = SystemReminder::security_block("shell", &[]);
        assert!(bare.content.contains("security policy"));
    }

    #[test]
    fn test_confirmation_denied_variants() {
        let timed_out = SystemReminder::confirmation_denied("write_file", true);
        assert!(timed_out.content.contains("timeout"));

        let declined = SystemReminder::confirmation_denied("write_file", false);
        assert!(declined.content.contains("declined"));
    }

    #[test]
    fn test_render_is_bracketed() {
        let reminder = SystemReminder::mode_changed("plan", "default");
        let rendered = reminder.render();
        assert!(rendered.starts_with("[system reminder:"));
        assert!(rendered.contains("plan"));
    }
}
