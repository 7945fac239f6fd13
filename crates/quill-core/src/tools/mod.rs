//! Tool contract and registry
//!
//! Concrete tools (file IO, web fetch, shell) live in the embedding
//! application; this crate defines the trait they implement and the
//! registry that executes them with timeout and cancellation.

pub mod registry;

pub use registry::{Tool, ToolExecutionResult, ToolInvocationContext, ToolRegistry};
