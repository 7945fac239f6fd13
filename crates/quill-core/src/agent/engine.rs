//! The agent engine — the single consumer loop over the message queue.
//!
//! `AgentEngine::run` spawns the loop and hands back an [`EngineHandle`]
//! plus the response channel. Per dequeued message the loop classifies the
//! payload, routes tool calls through the interceptor, applies context
//! mutations, compresses opportunistically, and emits [`AgentResponse`]
//! events. A failed message emits an error response and the loop moves on;
//! only closing the queue ends it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfiguration;
use crate::context::{ArticleContext, ContextCompressor, ContextMutation, DialogueRole};
use crate::permissions::{
    InterceptionResult, PermissionConfirmationService, PermissionManager, PermissionRequest,
    PlanModeManager, SystemReminder, ToolInterceptor,
};
use crate::queue::{
    Message, MessagePayload, MessageQueue, QueueError, QueueMetrics, SystemNotice, ToolCall,
};
use crate::security::SecurityValidator;
use crate::tools::{ToolInvocationContext, ToolRegistry};

use super::failure::FailureTracker;
use super::responses::AgentResponse;
use super::state::{AgentContext, AgentState, AgentStatistics};

/// Shared services the engine needs. Constructed by the embedder and
/// injected; the engine never reaches for process-global state.
pub struct EngineServices {
    pub tool_registry: Arc<ToolRegistry>,
    pub validator: Arc<SecurityValidator>,
    pub plan_mode: Arc<PlanModeManager>,
    pub confirmations: Arc<PermissionConfirmationService>,
}

impl EngineServices {
    /// Build the standard service set from a configuration. Returns the
    /// receiver the UI drains for permission prompts.
    pub fn from_config(
        config: &AgentConfiguration,
    ) -> (Self, mpsc::UnboundedReceiver<PermissionRequest>) {
        let (confirmations, prompt_rx) =
            PermissionConfirmationService::with_timeout(config.confirmation_timeout());
        (
            Self {
                tool_registry: Arc::new(ToolRegistry::with_timeout(config.tool_timeout())),
                validator: Arc::new(SecurityValidator::new(config.security.clone())),
                plan_mode: Arc::new(PlanModeManager::new()),
                confirmations: Arc::new(confirmations),
            },
            prompt_rx,
        )
    }
}

/// Point-in-time engine health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub state: AgentState,
    pub queue: QueueMetrics,
    pub statistics: AgentStatistics,
}

/// Caller-side handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    queue: Arc<MessageQueue>,
    context: Arc<RwLock<AgentContext>>,
    in_flight: Arc<DashMap<String, CancellationToken>>,
}

impl EngineHandle {
    /// Enqueue a message. `Ok(false)` means the queue dropped it at
    /// capacity.
    pub fn send_message(&self, message: Message) -> Result<bool, QueueError> {
        self.queue.enqueue(message)
    }

    /// Cancel an in-flight tool call by id. Returns false when the id is
    /// unknown or the call already finished.
    pub fn cancel_tool(&self, call_id: &str) -> bool {
        match self.in_flight.get(call_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Close the queue. The loop drains accepted messages, then exits.
    /// In-flight tool calls keep running.
    pub fn shutdown(&self) {
        self.queue.close();
    }

    pub fn health_status(&self) -> HealthStatus {
        let context = self.context.read();
        HealthStatus {
            healthy: context.current_state != AgentState::Error && !self.queue.is_closed(),
            state: context.current_state,
            queue: self.queue.metrics(),
            statistics: context.statistics.clone(),
        }
    }

    pub fn context_snapshot(&self) -> AgentContext {
        self.context.read().clone()
    }
}

/// The orchestrator. Built from injected services, consumed by [`run`].
///
/// [`run`]: AgentEngine::run
pub struct AgentEngine {
    config: AgentConfiguration,
    queue: Arc<MessageQueue>,
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionManager>,
    plan_mode: Arc<PlanModeManager>,
    interceptor: Arc<ToolInterceptor>,
    context: Arc<RwLock<AgentContext>>,
    in_flight: Arc<DashMap<String, CancellationToken>>,
    tool_slots: Arc<Semaphore>,
    failures: Arc<Mutex<FailureTracker>>,
    compressor: ContextCompressor,
    article: ArticleContext,
}

impl AgentEngine {
    pub fn new(services: EngineServices, config: AgentConfiguration) -> Result<Self> {
        let queue = Arc::new(MessageQueue::new(
            config.queue_capacity,
            config.queue_backpressure_threshold,
        )?);
        let permissions = Arc::new(PermissionManager::new(services.plan_mode.clone()));
        let interceptor = Arc::new(ToolInterceptor::new(
            permissions.clone(),
            services.plan_mode.clone(),
            services.validator,
            services.tool_registry.clone(),
            services.confirmations,
            config.is_strict(),
        ));
        let compressor = ContextCompressor::with_budget(
            config.context_token_budget,
            config.context_compression_threshold,
        );
        let session_id = uuid::Uuid::new_v4().to_string();

        tracing::info!(session_id = %session_id, "agent engine created");

        Ok(Self {
            queue,
            registry: services.tool_registry,
            permissions,
            plan_mode: services.plan_mode,
            interceptor,
            context: Arc::new(RwLock::new(AgentContext::new(session_id))),
            in_flight: Arc::new(DashMap::new()),
            tool_slots: Arc::new(Semaphore::new(config.max_concurrent_tools.max(1))),
            failures: Arc::new(Mutex::new(FailureTracker::new())),
            compressor,
            article: ArticleContext::new(),
            config,
        })
    }

    pub fn queue(&self) -> Arc<MessageQueue> {
        self.queue.clone()
    }

    /// Start the consumer loop. Returns the handle and the response
    /// stream; the loop runs as a spawned task until the queue closes.
    pub fn run(self) -> (EngineHandle, mpsc::UnboundedReceiver<AgentResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = EngineHandle {
            queue: self.queue.clone(),
            context: self.context.clone(),
            in_flight: self.in_flight.clone(),
        };

        tokio::spawn(async move {
            self.run_inner(tx).await;
        });

        (handle, rx)
    }

    async fn run_inner(mut self, tx: mpsc::UnboundedSender<AgentResponse>) {
        let queue = self.queue.clone();
        while let Some(message) = queue.recv().await {
            if message.is_expired(chrono::Utc::now()) {
                tracing::debug!(id = %message.id, "skipping expired message");
                continue;
            }

            let started = Instant::now();
            self.context.write().current_state = AgentState::Processing;

            let message_id = message.id;
            let outcome = self.handle_message(message, &tx).await;
            let errored = outcome.is_err();
            let prompted = matches!(&outcome, Ok(true));

            if let Err(error) = outcome {
                tracing::error!(id = %message_id, %error, "message handling failed");
                self.context.write().current_state = AgentState::Error;
                let _ = tx.send(AgentResponse::error(format!(
                    "failed to process message: {}",
                    error
                )));
            }

            // Statistics run on the error path too.
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let resting = if prompted {
                AgentState::WaitingForInput
            } else {
                AgentState::for_mode(self.plan_mode.current_mode())
            };
            let mut context = self.context.write();
            context.statistics.record(elapsed_ms, errored);
            context.current_state = resting;
        }

        tracing::info!("agent engine loop finished");
    }

    /// Returns true when the message produced a `Prompt`, so the loop can
    /// rest in `WaitingForInput` afterwards.
    async fn handle_message(
        &mut self,
        message: Message,
        tx: &mpsc::UnboundedSender<AgentResponse>,
    ) -> Result<bool> {
        match message.payload {
            MessagePayload::UserInput { text } => {
                self.article.add_dialogue(DialogueRole::User, text.clone());
                self.maybe_compress(tx);
                let _ = tx.send(AgentResponse::Prompt {
                    content: text,
                    allowed_tools: self.allowed_tools().await,
                    max_tokens: None,
                });
                return Ok(true);
            }

            MessagePayload::SlashCommand { command, args } => {
                return Ok(self.handle_slash_command(&command, &args, tx).await);
            }

            MessagePayload::ToolInvocation { call } => {
                self.dispatch_tool_call(call, tx).await;
            }

            MessagePayload::AgentResponse { content, is_final } => {
                if is_final {
                    self.article
                        .add_dialogue(DialogueRole::Assistant, content.clone());
                    self.maybe_compress(tx);
                    let _ = tx.send(AgentResponse::success(content));
                } else {
                    let _ = tx.send(AgentResponse::progress(content));
                }
            }

            MessagePayload::ContextUpdate { update } => {
                self.apply_context_update(update, tx);
            }

            MessagePayload::SystemNotification { notice } => match notice {
                SystemNotice::ModeChanged { mode, reason } => {
                    let content = match reason {
                        Some(reason) => {
                            format!("permission mode is now {} ({})", mode, reason)
                        }
                        None => format!("permission mode is now {}", mode),
                    };
                    let _ = tx.send(AgentResponse::Plan {
                        content,
                        metadata: None,
                    });
                }
                SystemNotice::Shutdown => {
                    let _ = tx.send(AgentResponse::progress("shutting down"));
                }
                SystemNotice::Info { message } => {
                    let _ = tx.send(AgentResponse::progress(message));
                }
            },

            MessagePayload::TaskAssignment {
                task_id,
                description,
            } => {
                let _ = tx.send(AgentResponse::Prompt {
                    content: format!("Task {}: {}", task_id, description),
                    allowed_tools: self.allowed_tools().await,
                    max_tokens: None,
                });
                return Ok(true);
            }

            MessagePayload::TodoListUpdated { todos } => {
                let _ = tx.send(AgentResponse::Component {
                    component: "todo_list".to_string(),
                    data: serde_json::to_value(&todos)?,
                });
            }

            MessagePayload::TodoStatusChanged { id, status } => {
                let _ = tx.send(AgentResponse::Component {
                    component: "todo_status".to_string(),
                    data: serde_json::json!({ "id": id, "status": status }),
                });
            }
        }

        Ok(false)
    }

    async fn handle_slash_command(
        &mut self,
        command: &str,
        args: &str,
        tx: &mpsc::UnboundedSender<AgentResponse>,
    ) -> bool {
        match command {
            "compact" => {
                let outcome = self.compressor.compress(&self.article);
                self.article = outcome.context;
                let _ = tx.send(AgentResponse::Component {
                    component: "compression".to_string(),
                    data: serde_json::to_value(&outcome.result).unwrap_or_default(),
                });
            }
            "plan" => {
                self.plan_mode.enter_plan_mode();
                let _ = tx.send(AgentResponse::Plan {
                    content: "plan mode active: read-only tools until a plan is approved"
                        .to_string(),
                    metadata: None,
                });
            }
            "status" => {
                let context = self.context.read().clone();
                let _ = tx.send(AgentResponse::Component {
                    component: "status".to_string(),
                    data: serde_json::json!({
                        "session_id": context.session_id,
                        "state": context.current_state,
                        "statistics": context.statistics,
                        "queue": self.queue.metrics(),
                        "mode": self.plan_mode.current_mode(),
                        "compressor": self.compressor.stats(),
                    }),
                });
            }
            // Anything else belongs to the external command catalog.
            other => {
                let _ = tx.send(AgentResponse::Prompt {
                    content: format!("/{} {}", other, args).trim_end().to_string(),
                    allowed_tools: self.allowed_tools().await,
                    max_tokens: None,
                });
                return true;
            }
        }
        false
    }

    async fn dispatch_tool_call(
        &mut self,
        call: ToolCall,
        tx: &mpsc::UnboundedSender<AgentResponse>,
    ) {
        let _ = tx.send(AgentResponse::progress(format!(
            "running tool '{}'",
            call.name
        )));

        let token = CancellationToken::new();
        self.in_flight.insert(call.id.clone(), token.clone());
        let ctx = ToolInvocationContext::new(self.context.read().session_id.clone())
            .with_cancellation(token);

        if self.config.max_concurrent_tools <= 1 {
            let result = self.interceptor.intercept_tool_call(&call, &ctx).await;
            self.in_flight.remove(&call.id);
            finish_tool_call(
                &call,
                result,
                tx,
                &self.queue,
                &self.failures,
                &self.context,
            );
        } else {
            let interceptor = self.interceptor.clone();
            let in_flight = self.in_flight.clone();
            let queue = self.queue.clone();
            let failures = self.failures.clone();
            let context = self.context.clone();
            let tx = tx.clone();
            let slots = self.tool_slots.clone();

            tokio::spawn(async move {
                // Semaphore is never closed, acquire cannot fail.
                let Ok(_permit) = slots.acquire_owned().await else {
                    return;
                };
                let result = interceptor.intercept_tool_call(&call, &ctx).await;
                in_flight.remove(&call.id);
                finish_tool_call(&call, result, &tx, &queue, &failures, &context);
            });
        }
    }

    fn apply_context_update(
        &mut self,
        update: ContextMutation,
        tx: &mpsc::UnboundedSender<AgentResponse>,
    ) {
        self.article.apply(update);
        self.maybe_compress(tx);
    }

    fn maybe_compress(&mut self, tx: &mpsc::UnboundedSender<AgentResponse>) {
        if !self.compressor.should_compress(&self.article) {
            return;
        }
        let outcome = self.compressor.compress(&self.article);
        self.article = outcome.context;
        let _ = tx.send(AgentResponse::Component {
            component: "compression".to_string(),
            data: serde_json::to_value(&outcome.result).unwrap_or_default(),
        });
    }

    async fn allowed_tools(&self) -> Vec<String> {
        let mut allowed = Vec::new();
        for name in self.registry.names().await {
            if self.permissions.check_tool_permission(&name).allowed {
                allowed.push(name);
            }
        }
        allowed
    }
}

/// Turn an interception result into responses, failure bookkeeping, and
/// (for plan exits) a re-enqueued mode-change notice. Shared by the inline
/// and spawned tool paths.
fn finish_tool_call(
    call: &ToolCall,
    result: InterceptionResult,
    tx: &mpsc::UnboundedSender<AgentResponse>,
    queue: &MessageQueue,
    failures: &Mutex<FailureTracker>,
    context: &RwLock<AgentContext>,
) {
    match result {
        InterceptionResult::Blocked { reason, reminder } => {
            context.write().statistics.error_count += 1;
            let _ = tx.send(AgentResponse::Error {
                content: reason,
                metadata: Some(serde_json::json!({ "reminder": reminder.render() })),
            });
        }
        InterceptionResult::Executed {
            result,
            reminder,
            mode_changed,
        } => {
            let diagnostic = failures.lock().observe(&call.name, &result);

            if result.success {
                let _ = tx.send(AgentResponse::Success {
                    content: result.content,
                    metadata: result.metadata,
                });
            } else {
                // Canceled and timed-out calls land here too.
                context.write().statistics.error_count += 1;
                let _ = tx.send(AgentResponse::error(
                    result
                        .error
                        .unwrap_or_else(|| format!("tool '{}' failed", call.name)),
                ));
            }

            if let Some(mode) = mode_changed {
                let notice = SystemNotice::ModeChanged {
                    mode,
                    reason: Some("plan approved".to_string()),
                };
                if let Err(error) = queue.enqueue(Message::system_notification(notice)) {
                    tracing::warn!(%error, "could not enqueue mode change notice");
                }
            }
            if let Some(reminder) = reminder {
                let _ = tx.send(AgentResponse::progress(reminder.render()));
            }
            if let Some(diagnostic) = diagnostic {
                let reminder = SystemReminder::repeated_failure(&diagnostic);
                let _ = tx.send(AgentResponse::Error {
                    content: diagnostic,
                    metadata: Some(serde_json::json!({ "reminder": reminder.render() })),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Priority;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::time::timeout;

    struct EchoTool;

    #[async_trait]
    impl crate::tools::Tool for EchoTool {
        fn name(&self) -> &str {
            "read_article"
        }

        fn description(&self) -> &str {
            "Reads the current article"
        }

        async fn execute(
            &self,
            _input: Value,
            _ctx: &ToolInvocationContext,
        ) -> crate::tools::ToolExecutionResult {
            crate::tools::ToolExecutionResult::success("article body")
        }
    }

    struct SlowTool;

    #[async_trait]
    impl crate::tools::Tool for SlowTool {
        fn name(&self) -> &str {
            "web_search"
        }

        fn description(&self) -> &str {
            "Slow read-only search"
        }

        async fn execute(
            &self,
            _input: Value,
            ctx: &ToolInvocationContext,
        ) -> crate::tools::ToolExecutionResult {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => {
                    crate::tools::ToolExecutionResult::failure("search was canceled")
                }
                _ = tokio::time::sleep(Duration::from_secs(10)) => {
                    crate::tools::ToolExecutionResult::success("results")
                }
            }
        }
    }

    async fn engine(config: AgentConfiguration) -> AgentEngine {
        let (services, _prompts) = EngineServices::from_config(&config);
        services.tool_registry.register(Arc::new(EchoTool)).await;
        services.tool_registry.register(Arc::new(SlowTool)).await;
        AgentEngine::new(services, config).unwrap()
    }

    async fn next_response(rx: &mut mpsc::UnboundedReceiver<AgentResponse>) -> AgentResponse {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for response")
            .expect("response channel closed")
    }

    #[tokio::test]
    async fn test_user_input_yields_prompt_with_allowed_tools() {
        let engine = engine(AgentConfiguration::default()).await;
        let (handle, mut rx) = engine.run();

        handle
            .send_message(Message::user_input("tighten the intro"))
            .unwrap();

        match next_response(&mut rx).await {
            AgentResponse::Prompt {
                content,
                allowed_tools,
                ..
            } => {
                assert_eq!(content, "tighten the intro");
                assert!(allowed_tools.contains(&"read_article".to_string()));
            }
            other => panic!("expected prompt, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_tool_invocation_runs_inline() {
        let config = AgentConfiguration {
            max_concurrent_tools: 1,
            ..AgentConfiguration::default()
        };
        let engine = engine(config).await;
        let (handle, mut rx) = engine.run();

        handle
            .send_message(Message::tool_invocation(ToolCall::new(
                "read_article",
                json!({}),
            )))
            .unwrap();

        match next_response(&mut rx).await {
            AgentResponse::Progress { content } => assert!(content.contains("read_article")),
            other => panic!("expected progress, got {:?}", other),
        }
        match next_response(&mut rx).await {
            AgentResponse::Success { content, .. } => assert_eq!(content, "article body"),
            other => panic!("expected success, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_plan_mode_blocks_writes_then_exit_restores() {
        let engine = engine(AgentConfiguration::default()).await;
        let (handle, mut rx) = engine.run();

        handle.send_message(Message::slash_command("plan", "")).unwrap();
        match next_response(&mut rx).await {
            AgentResponse::Plan { content, .. } => assert!(content.contains("plan mode")),
            other => panic!("expected plan, got {:?}", other),
        }

        // A write tool is blocked while planning.
        handle
            .send_message(Message::tool_invocation(ToolCall::new(
                "edit_article",
                json!({}),
            )))
            .unwrap();
        let _ = next_response(&mut rx).await; // progress
        match next_response(&mut rx).await {
            AgentResponse::Error { content, metadata } => {
                assert!(content.contains("plan mode"));
                assert!(metadata.unwrap()["reminder"]
                    .as_str()
                    .unwrap()
                    .contains("exit_plan_mode"));
            }
            other => panic!("expected error, got {:?}", other),
        }

        // Approving a plan flips the mode back and re-enqueues a notice.
        handle
            .send_message(Message::tool_invocation(ToolCall::new(
                "exit_plan_mode",
                json!({"plan": "Revise draft\n1. tighten intro\n2. check sources"}),
            )))
            .unwrap();
        let _ = next_response(&mut rx).await; // progress
        match next_response(&mut rx).await {
            AgentResponse::Success { content, .. } => assert!(content.contains("approved")),
            other => panic!("expected success, got {:?}", other),
        }
        let _ = next_response(&mut rx).await; // mode-change reminder progress
        match next_response(&mut rx).await {
            AgentResponse::Plan { content, .. } => assert!(content.contains("default")),
            other => panic!("expected plan notice, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_prompt_leaves_engine_waiting_for_input() {
        let config = AgentConfiguration {
            max_concurrent_tools: 1,
            ..AgentConfiguration::default()
        };
        let engine = engine(config).await;
        let (handle, mut rx) = engine.run();

        handle.send_message(Message::user_input("draft a lede")).unwrap();
        let _ = next_response(&mut rx).await; // prompt

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            handle.context_snapshot().current_state,
            AgentState::WaitingForInput
        );

        // A non-prompt message returns the engine to its mode resting state.
        handle
            .send_message(Message::tool_invocation(ToolCall::new(
                "read_article",
                json!({}),
            )))
            .unwrap();
        let _ = next_response(&mut rx).await; // progress
        let _ = next_response(&mut rx).await; // success

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.context_snapshot().current_state, AgentState::Idle);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_statistics_update_per_message() {
        let engine = engine(AgentConfiguration::default()).await;
        let (handle, mut rx) = engine.run();

        handle.send_message(Message::user_input("one")).unwrap();
        handle.send_message(Message::user_input("two")).unwrap();
        let _ = next_response(&mut rx).await;
        let _ = next_response(&mut rx).await;

        // The loop records statistics after emitting, so give it a beat.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let health = handle.health_status();
        assert!(health.healthy);
        assert_eq!(health.statistics.messages_processed, 2);
        assert_eq!(health.statistics.error_count, 0);
        assert!(health.statistics.last_activity.is_some());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_tool_counts_as_failure() {
        let config = AgentConfiguration {
            max_concurrent_tools: 4,
            ..AgentConfiguration::default()
        };
        let engine = engine(config).await;
        let (handle, mut rx) = engine.run();

        let call = ToolCall::new("web_search", json!({"query": "rust channels"}));
        let call_id = call.id.clone();
        handle.send_message(Message::tool_invocation(call)).unwrap();

        let _ = next_response(&mut rx).await; // progress
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.cancel_tool(&call_id));

        match next_response(&mut rx).await {
            AgentResponse::Error { content, .. } => assert!(content.contains("canceled")),
            other => panic!("expected error, got {:?}", other),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.health_status().statistics.error_count >= 1);
        assert!(!handle.cancel_tool(&call_id));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_context_update_and_compact_command() {
        let config = AgentConfiguration {
            context_token_budget: 200,
            context_compression_threshold: 0.5,
            ..AgentConfiguration::default()
        };
        let engine = engine(config).await;
        let (handle, mut rx) = engine.run();

        let notes = vec!["note"; 200].join(" ");
        for i in 0..3 {
            handle
                .send_message(Message::context_update(ContextMutation::AddResearch {
                    item: crate::context::ResearchItem::new(format!("topic {}", i), &notes, 0.3),
                }))
                .unwrap();
        }

        // Compression fires once the estimate crosses the tiny budget.
        match next_response(&mut rx).await {
            AgentResponse::Component { component, data } => {
                assert_eq!(component, "compression");
                assert!(data["items_removed"].as_u64().unwrap() > 0);
            }
            other => panic!("expected compression report, got {:?}", other),
        }

        handle.send_message(Message::slash_command("compact", "")).unwrap();
        let mut saw_compact_report = false;
        for _ in 0..3 {
            if let AgentResponse::Component { component, .. } = next_response(&mut rx).await {
                if component == "compression" {
                    saw_compact_report = true;
                    break;
                }
            }
        }
        assert!(saw_compact_report);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_priority_orders_processing() {
        let engine = engine(AgentConfiguration::default()).await;
        let queue = engine.queue();

        // Enqueue before the loop starts so priority decides the order.
        queue
            .enqueue(Message::with_priority(
                MessagePayload::UserInput {
                    text: "background".into(),
                },
                Priority::Background,
                crate::queue::MessageSource::User,
            ))
            .unwrap();
        queue
            .enqueue(Message::with_priority(
                MessagePayload::UserInput {
                    text: "critical".into(),
                },
                Priority::Critical,
                crate::queue::MessageSource::User,
            ))
            .unwrap();

        let (handle, mut rx) = engine.run();

        match next_response(&mut rx).await {
            AgentResponse::Prompt { content, .. } => assert_eq!(content, "critical"),
            other => panic!("expected prompt, got {:?}", other),
        }
        match next_response(&mut rx).await {
            AgentResponse::Prompt { content, .. } => assert_eq!(content, "background"),
            other => panic!("expected prompt, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_ends() {
        let engine = engine(AgentConfiguration::default()).await;
        let (handle, mut rx) = engine.run();

        handle.send_message(Message::user_input("last words")).unwrap();
        handle.shutdown();

        assert!(matches!(
            handle.send_message(Message::user_input("too late")),
            Err(QueueError::Closed)
        ));

        match next_response(&mut rx).await {
            AgentResponse::Prompt { content, .. } => assert_eq!(content, "last words"),
            other => panic!("expected prompt, got {:?}", other),
        }

        // Channel closes once the loop exits.
        let end = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(end.is_none());
        assert!(!handle.health_status().healthy);
    }

    #[tokio::test]
    async fn test_expired_messages_are_skipped() {
        let engine = engine(AgentConfiguration::default()).await;
        let queue = engine.queue();

        let stale = Message::user_input("stale")
            .with_deadline(chrono::Utc::now() - chrono::Duration::seconds(5));
        queue.enqueue(stale).unwrap();
        queue.enqueue(Message::user_input("fresh")).unwrap();

        let (handle, mut rx) = engine.run();

        match next_response(&mut rx).await {
            AgentResponse::Prompt { content, .. } => assert_eq!(content, "fresh"),
            other => panic!("expected prompt, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_todo_messages_become_components() {
        let engine = engine(AgentConfiguration::default()).await;
        let (handle, mut rx) = engine.run();

        handle
            .send_message(Message::new(
                MessagePayload::TodoListUpdated {
                    todos: vec![crate::queue::TodoItem {
                        id: "1".into(),
                        content: "outline part two".into(),
                        status: crate::queue::TodoStatus::Pending,
                    }],
                },
                crate::queue::MessageSource::System,
            ))
            .unwrap();

        match next_response(&mut rx).await {
            AgentResponse::Component { component, data } => {
                assert_eq!(component, "todo_list");
                assert_eq!(data[0]["content"], "outline part two");
            }
            other => panic!("expected component, got {:?}", other),
        }

        handle.shutdown();
    }
}
