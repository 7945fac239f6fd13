//! Response events emitted by the engine.
//!
//! `AgentResponse` is the single outward protocol: the UI drains these from
//! the channel returned by `AgentEngine::run` and maps them to its own
//! presentation.

use serde::Serialize;
use serde_json::Value;

/// One event emitted to the consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    /// A message was handled to completion.
    Success {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },

    /// A message failed; the engine has already recovered.
    Error {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },

    /// Text that should be sent to the model, with the tools currently
    /// available to it.
    Prompt {
        content: String,
        allowed_tools: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_tokens: Option<usize>,
    },

    /// Structured data for a specific UI component (todo list,
    /// compression report).
    Component { component: String, data: Value },

    /// Incremental progress (streamed deltas, tool lifecycle).
    Progress { content: String },

    /// Plan lifecycle event (entered plan mode, plan approved).
    Plan {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
}

impl AgentResponse {
    pub fn success(content: impl Into<String>) -> Self {
        AgentResponse::Success {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        AgentResponse::Error {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn progress(content: impl Into<String>) -> Self {
        AgentResponse::Progress {
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentResponse::Error { .. })
    }
}
