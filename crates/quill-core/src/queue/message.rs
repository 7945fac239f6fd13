//! Message types flowing through the priority queue.
//!
//! `Message` is the single unit of work the engine consumes. Producers (UI,
//! provider client, tools, the engine itself) build messages through the
//! factory constructors so every message carries an id, a timestamp, and a
//! source; payloads are immutable once enqueued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ContextMutation;
use crate::permissions::PermissionMode;

/// Scheduling priority. Higher values dequeue first; equal values drain
/// in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
    Background,
}

impl Priority {
    /// Numeric weight used for ordering.
    pub fn value(&self) -> u8 {
        match self {
            Priority::Critical => 100,
            Priority::High => 80,
            Priority::Normal => 50,
            Priority::Low => 20,
            Priority::Background => 10,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value().cmp(&other.value())
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    User,
    Agent,
    Tool,
    System,
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageSource::User => "user",
            MessageSource::Agent => "agent",
            MessageSource::Tool => "tool",
            MessageSource::System => "system",
        };
        f.write_str(s)
    }
}

/// A tool call headed for the interception pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            input,
        }
    }
}

/// Todo item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// A single todo list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

/// Internal lifecycle notices carried by `SystemNotification` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemNotice {
    /// Permission mode changed (e.g. plan mode exit).
    ModeChanged {
        mode: PermissionMode,
        reason: Option<String>,
    },
    /// Engine is shutting down after the queue drains.
    Shutdown,
    /// Free-form informational notice.
    Info { message: String },
}

/// Payload of a queued message, one variant per message kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Free-form user input headed for the model.
    UserInput { text: String },

    /// Model output re-entering the loop (streamed deltas and final turns).
    AgentResponse { content: String, is_final: bool },

    /// A tool call to run through permission, security, and execution.
    ToolInvocation { call: ToolCall },

    /// Internal lifecycle notice.
    SystemNotification { notice: SystemNotice },

    /// A discrete work item handed to the agent.
    TaskAssignment { task_id: String, description: String },

    /// Slash command with its raw argument string.
    SlashCommand { command: String, args: String },

    /// Mutation of the writing context.
    ContextUpdate { update: ContextMutation },

    /// Full todo list replacement.
    TodoListUpdated { todos: Vec<TodoItem> },

    /// Status change of a single todo.
    TodoStatusChanged { id: String, status: TodoStatus },
}

/// Discriminant-only view of a payload, for classification and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserInput,
    AgentResponse,
    ToolInvocation,
    SystemNotification,
    TaskAssignment,
    SlashCommand,
    ContextUpdate,
    TodoListUpdated,
    TodoStatusChanged,
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::UserInput { .. } => MessageType::UserInput,
            MessagePayload::AgentResponse { .. } => MessageType::AgentResponse,
            MessagePayload::ToolInvocation { .. } => MessageType::ToolInvocation,
            MessagePayload::SystemNotification { .. } => MessageType::SystemNotification,
            MessagePayload::TaskAssignment { .. } => MessageType::TaskAssignment,
            MessagePayload::SlashCommand { .. } => MessageType::SlashCommand,
            MessagePayload::ContextUpdate { .. } => MessageType::ContextUpdate,
            MessagePayload::TodoListUpdated { .. } => MessageType::TodoListUpdated,
            MessagePayload::TodoStatusChanged { .. } => MessageType::TodoStatusChanged,
        }
    }
}

/// A unit of work in the queue. Built through the factory constructors;
/// fields are never mutated after enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub payload: MessagePayload,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub source: MessageSource,
    /// Optional deadline after which the message is stale and skipped.
    pub deadline: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a message with the default (normal) priority.
    pub fn new(payload: MessagePayload, source: MessageSource) -> Self {
        Self::with_priority(payload, Priority::Normal, source)
    }

    /// Build a message with an explicit priority.
    pub fn with_priority(payload: MessagePayload, priority: Priority, source: MessageSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            priority,
            timestamp: Utc::now(),
            source,
            deadline: None,
        }
    }

    /// Attach a staleness deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d < now)
    }

    // ── Convenience constructors ───────────────────────────────────────

    pub fn user_input(text: impl Into<String>) -> Self {
        Self::new(
            MessagePayload::UserInput { text: text.into() },
            MessageSource::User,
        )
    }

    pub fn agent_response(content: impl Into<String>, is_final: bool) -> Self {
        Self::new(
            MessagePayload::AgentResponse {
                content: content.into(),
                is_final,
            },
            MessageSource::Agent,
        )
    }

    pub fn tool_invocation(call: ToolCall) -> Self {
        Self::new(MessagePayload::ToolInvocation { call }, MessageSource::Agent)
    }

    /// System notices jump ahead of user/agent traffic.
    pub fn system_notification(notice: SystemNotice) -> Self {
        Self::with_priority(
            MessagePayload::SystemNotification { notice },
            Priority::High,
            MessageSource::System,
        )
    }

    pub fn slash_command(command: impl Into<String>, args: impl Into<String>) -> Self {
        Self::new(
            MessagePayload::SlashCommand {
                command: command.into(),
                args: args.into(),
            },
            MessageSource::User,
        )
    }

    pub fn context_update(update: ContextMutation) -> Self {
        Self::new(
            MessagePayload::ContextUpdate { update },
            MessageSource::System,
        )
    }
}
