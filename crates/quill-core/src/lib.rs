//! Quill core — agent orchestration for a terminal writing assistant.
//!
//! The crate is the control plane between a UI, an AI provider client,
//! and a set of tools, none of which live here:
//!
//! - [`queue`] — the priority message queue every component communicates
//!   through
//! - [`agent`] — the engine that consumes the queue and emits responses
//! - [`context`] — the writing-session working set and its compressor
//! - [`security`] — the six-layer validation pipeline
//! - [`permissions`] — mode gating, plan lifecycle, and tool interception
//! - [`tools`] — the contract external tools implement
//!
//! Typical wiring:
//!
//! ```no_run
//! use quill_core::agent::{AgentEngine, EngineServices};
//! use quill_core::config::AgentConfiguration;
//! use quill_core::queue::Message;
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = AgentConfiguration::default();
//! let (services, _permission_prompts) = EngineServices::from_config(&config);
//! // services.tool_registry.register(...) for each tool implementation.
//!
//! let engine = AgentEngine::new(services, config)?;
//! let (handle, mut responses) = engine.run();
//!
//! handle.send_message(Message::user_input("draft an intro about message queues"))?;
//! while let Some(response) = responses.recv().await {
//!     // render the response; drain _permission_prompts and answer them
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod permissions;
pub mod queue;
pub mod security;
pub mod tools;

pub use agent::{AgentEngine, AgentResponse, EngineHandle, EngineServices};
pub use config::{AgentConfiguration, SecurityConfig, SecurityLevel};
pub use queue::{Message, MessageQueue, Priority};
