//! Tool contract and registry.
//!
//! Tools are implemented outside this crate and registered here. The
//! registry owns execution mechanics: lookup, timeout, cancellation, and
//! output truncation. Unknown tools and timeouts come back as failure
//! results, not errors, so the engine's statistics always have something
//! to record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Default tool execution timeout (2 minutes).
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Cap on result content carried back into the loop.
const MAX_RESULT_CHARS: usize = 30_000;

/// Result of one tool execution.
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecutionResult {
    pub success: bool,
    pub content: String,
    pub metadata: Option<Value>,
    pub error: Option<String>,
}

impl ToolExecutionResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            metadata: None,
            error: None,
        }
    }

    pub fn success_with_metadata(content: impl Into<String>, metadata: Value) -> Self {
        Self {
            success: true,
            content: content.into(),
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            metadata: None,
            error: Some(error.into()),
        }
    }
}

/// Per-invocation context handed to tools.
#[derive(Debug, Clone)]
pub struct ToolInvocationContext {
    pub session_id: String,
    pub cancellation: CancellationToken,
}

impl ToolInvocationContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id).
    fn name(&self) -> &str;

    /// Tool description for prompt assembly.
    fn description(&self) -> &str;

    /// JSON schema for the input payload.
    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    /// Execute the tool. Long-running tools should poll
    /// `ctx.cancellation` at natural suspension points.
    async fn execute(&self, input: Value, ctx: &ToolInvocationContext) -> ToolExecutionResult;
}

/// Registry for the available tools.
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
    default_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            default_timeout,
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        tools.insert(name, tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Registered tool names, sorted for stable prompt assembly.
    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a tool under the configured timeout and the caller's
    /// cancellation token. Cancellation and timeout both come back as
    /// failure results.
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: &ToolInvocationContext,
    ) -> ToolExecutionResult {
        let Some(tool) = self.get(name).await else {
            tracing::warn!(tool = name, "unknown tool requested");
            return ToolExecutionResult::failure(format!("unknown tool '{}'", name));
        };

        let started = Instant::now();
        tracing::debug!(tool = name, "executing tool");

        let mut result = tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                tracing::warn!(tool = name, "tool execution canceled");
                ToolExecutionResult::failure(format!("tool '{}' was canceled", name))
            }
            outcome = tokio::time::timeout(self.default_timeout, tool.execute(input, ctx)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            tool = name,
                            timeout_secs = self.default_timeout.as_secs(),
                            "tool execution timed out"
                        );
                        ToolExecutionResult::failure(format!(
                            "tool '{}' timed out after {} seconds",
                            name,
                            self.default_timeout.as_secs()
                        ))
                    }
                }
            }
        };

        result.content = truncate_content(result.content);

        tracing::info!(
            tool = name,
            success = result.success,
            duration_ms = started.elapsed().as_millis() as u64,
            "tool execution finished"
        );
        result
    }
}

fn truncate_content(content: String) -> String {
    if content.len() <= MAX_RESULT_CHARS {
        return content;
    }
    let mut cut = MAX_RESULT_CHARS;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = content[..cut].to_string();
    truncated.push_str("\n[output truncated]");
    truncated
}
