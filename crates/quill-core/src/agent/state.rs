//! Engine state and per-session statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::permissions::PermissionMode;

/// What the engine is doing right now. The three permission-mirror states
/// track the current [`PermissionMode`] while the engine is otherwise
/// idle; `WaitingForInput` takes precedence after a prompt has gone out
/// and the next user turn is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Processing,
    WaitingForInput,
    PlanMode,
    AcceptEdits,
    BypassPermissions,
    Error,
}

impl AgentState {
    /// Resting state for a permission mode.
    pub fn for_mode(mode: PermissionMode) -> Self {
        match mode {
            PermissionMode::Default => AgentState::Idle,
            PermissionMode::Plan => AgentState::PlanMode,
            PermissionMode::AcceptEdits => AgentState::AcceptEdits,
            PermissionMode::BypassPermissions => AgentState::BypassPermissions,
        }
    }
}

/// Rolling per-session counters. The latency average is updated on every
/// message, failures included.
#[derive(Debug, Clone, Serialize, Default)]
pub struct AgentStatistics {
    pub messages_processed: u64,
    /// Rolling mean handling time in milliseconds.
    pub average_response_time_ms: f64,
    pub error_count: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AgentStatistics {
    /// Record one handled message. Runs on the error path too.
    pub fn record(&mut self, elapsed_ms: f64, errored: bool) {
        self.messages_processed += 1;
        let n = self.messages_processed as f64;
        self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / n;
        if errored {
            self.error_count += 1;
        }
        self.last_activity = Some(Utc::now());
    }
}

/// Per-session engine state. Owned and mutated by the engine only;
/// everyone else sees cloned snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct AgentContext {
    pub session_id: String,
    pub current_state: AgentState,
    pub statistics: AgentStatistics,
}

impl AgentContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_state: AgentState::default(),
            statistics: AgentStatistics::default(),
        }
    }
}
