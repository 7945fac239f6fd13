//! Priority message queue
//!
//! The single ingress path into the agent engine. Producers build
//! [`Message`]s through the factory constructors and enqueue them; the
//! engine drains with [`MessageQueue::recv`].

pub mod message;
pub mod queue;

pub use message::{
    Message, MessagePayload, MessageSource, MessageType, Priority, SystemNotice, TodoItem,
    TodoStatus, ToolCall,
};
pub use queue::{MessageQueue, QueueError, QueueMetrics};
