//! Human-in-the-loop permission confirmation.
//!
//! The service emits a [`PermissionRequest`] event for the UI, parks the
//! calling flow on a oneshot keyed by the request id, and resolves when the
//! UI answers through [`PermissionConfirmationService::respond`]. An
//! unanswered request denies after the configured timeout (30 s default).
//! Constructed explicitly and injected; there is no process-global instance.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Default wait before an unanswered request is treated as a denial.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// A confirmation prompt for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionRequest {
    pub id: Uuid,
    pub tool_name: String,
    pub file_path: Option<String>,
    pub description: String,
    pub args: Option<Value>,
}

/// The user's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationDecision {
    Allow,
    /// Allow now and for the rest of the session.
    AllowSession,
    Deny,
}

/// Why a request resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Allowed,
    AllowedForSession,
    Denied,
    /// No answer arrived in time; treated as a denial.
    TimedOut,
}

impl ConfirmationOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            ConfirmationOutcome::Allowed | ConfirmationOutcome::AllowedForSession
        )
    }
}

/// Request/response handshake correlated by id.
pub struct PermissionConfirmationService {
    pending: DashMap<Uuid, oneshot::Sender<ConfirmationDecision>>,
    request_tx: mpsc::UnboundedSender<PermissionRequest>,
    timeout: Duration,
}

impl PermissionConfirmationService {
    /// Build the service plus the receiver the UI drains for prompts.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PermissionRequest>) {
        Self::with_timeout(DEFAULT_CONFIRMATION_TIMEOUT)
    }

    pub fn with_timeout(
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PermissionRequest>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: DashMap::new(),
                request_tx,
                timeout,
            },
            request_rx,
        )
    }

    /// Ask the user to confirm a tool call. Suspends until an answer
    /// arrives or the timeout elapses.
    pub async fn request(
        &self,
        tool_name: &str,
        file_path: Option<String>,
        description: impl Into<String>,
        args: Option<Value>,
    ) -> ConfirmationOutcome {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let request = PermissionRequest {
            id,
            tool_name: tool_name.to_string(),
            file_path,
            description: description.into(),
            args,
        };

        if self.request_tx.send(request).is_err() {
            // Nobody is listening for prompts; fail closed.
            self.pending.remove(&id);
            tracing::warn!(tool = tool_name, "no confirmation listener, denying");
            return ConfirmationOutcome::Denied;
        }

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(ConfirmationDecision::Allow)) => ConfirmationOutcome::Allowed,
            Ok(Ok(ConfirmationDecision::AllowSession)) => ConfirmationOutcome::AllowedForSession,
            Ok(Ok(ConfirmationDecision::Deny)) => ConfirmationOutcome::Denied,
            // Sender dropped without answering.
            Ok(Err(_)) => ConfirmationOutcome::Denied,
            Err(_) => {
                tracing::warn!(
                    tool = tool_name,
                    timeout_secs = self.timeout.as_secs(),
                    "confirmation timed out"
                );
                ConfirmationOutcome::TimedOut
            }
        };

        self.pending.remove(&id);
        outcome
    }

    /// Deliver the user's decision. Returns false when the id is unknown
    /// (already resolved or timed out).
    pub fn respond(&self, id: Uuid, decision: ConfirmationDecision) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Requests currently waiting on an answer.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_allow_resolves_request() {
        let (service, mut requests) = PermissionConfirmationService::new();
        let service = Arc::new(service);

        let waiter = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .request("write_file", Some("draft.md".into()), "Write the draft", None)
                    .await
            })
        };

        let prompt = requests.recv().await.unwrap();
        assert_eq!(prompt.tool_name, "write_file");
        assert_eq!(prompt.file_path.as_deref(), Some("draft.md"));

        assert!(service.respond(prompt.id, ConfirmationDecision::Allow));
        assert_eq!(waiter.await.unwrap(), ConfirmationOutcome::Allowed);
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_deny_and_session_decisions() {
        let (service, mut requests) = PermissionConfirmationService::new();
        let service = Arc::new(service);

        for (decision, expected) in [
            (ConfirmationDecision::Deny, ConfirmationOutcome::Denied),
            (
                ConfirmationDecision::AllowSession,
                ConfirmationOutcome::AllowedForSession,
            ),
        ] {
            let waiter = {
                let service = service.clone();
                tokio::spawn(
                    async move { service.request("edit_article", None, "Edit", None).await },
                )
            };
            let prompt = requests.recv().await.unwrap();
            service.respond(prompt.id, decision);
            assert_eq!(waiter.await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_timeout_is_a_denial() {
        let (service, _requests) =
            PermissionConfirmationService::with_timeout(Duration::from_millis(20));

        let outcome = service.request("shell", None, "Run a command", None).await;

        assert_eq!(outcome, ConfirmationOutcome::TimedOut);
        assert!(!outcome.is_allowed());
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_rejected() {
        let (service, _requests) = PermissionConfirmationService::new();
        assert!(!service.respond(Uuid::new_v4(), ConfirmationDecision::Allow));
    }

    #[tokio::test]
    async fn test_dropped_listener_fails_closed() {
        let (service, requests) =
            PermissionConfirmationService::with_timeout(Duration::from_secs(5));
        drop(requests);

        let outcome = service.request("write_file", None, "Write", None).await;
        assert_eq!(outcome, ConfirmationOutcome::Denied);
    }

    #[test]
    fn test_decision_serde_kebab_case() {
        let decision: ConfirmationDecision = serde_json::from_str("\"allow-session\"").unwrap();
        assert_eq!(decision, ConfirmationDecision::AllowSession);
        assert_eq!(
            serde_json::to_string(&ConfirmationDecision::Deny).unwrap(),
            "\"deny\""
        );
    }
}
