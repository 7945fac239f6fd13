//! The agent engine and its outward protocol.
//!
//! [`AgentEngine`] is the single consumer of the message queue. `run()`
//! spawns the loop and returns an [`EngineHandle`] plus the
//! [`AgentResponse`] stream; the embedding UI drives everything through
//! those two ends.

pub mod engine;
pub mod failure;
pub mod responses;
pub mod state;

pub use engine::{AgentEngine, EngineHandle, EngineServices, HealthStatus};
pub use failure::{FailureTracker, REPEATED_FAILURE_THRESHOLD};
pub use responses::AgentResponse;
pub use state::{AgentContext, AgentState, AgentStatistics};
