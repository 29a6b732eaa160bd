//! Producer Client: the three ways a service pushes an [`Action`] onto the
//! bus — fire-and-forget, pseudo-synchronous request/response, and
//! async-with-callback.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{naming, Action, ActionResponse, CoreError, ErrorDetail};
use relay_transport::{Broker, TransportError};
use uuid::Uuid;

#[derive(Debug)]
pub enum ClientError {
    /// `action_type` or another builder invariant was violated.
    InvalidAction(CoreError),
    /// `serde_json` failed to encode the outgoing action or decode the
    /// incoming response.
    Serialization(serde_json::Error),
    /// The broker itself could not complete the push or pop.
    Transport(TransportError),
    /// No response arrived within the caller's timeout.
    Timeout,
    /// A response arrived on the expected queue but its `correlation_id`
    /// did not match the request — discarded rather than handed back to
    /// the caller as if it belonged to this call.
    CorrelationMismatch,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::InvalidAction(e) => write!(f, "invalid action: {e}"),
            ClientError::Serialization(e) => write!(f, "serialization error: {e}"),
            ClientError::Transport(e) => write!(f, "transport error: {e}"),
            ClientError::Timeout => write!(f, "timed out waiting for a response"),
            ClientError::CorrelationMismatch => write!(f, "response correlation_id did not match the request"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<CoreError> for ClientError {
    fn from(e: CoreError) -> Self {
        ClientError::InvalidAction(e)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e)
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e)
    }
}

impl From<ClientError> for ErrorDetail {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidAction(e) => ErrorDetail::validation(e.to_string()),
            ClientError::Serialization(e) => ErrorDetail::validation(e.to_string()),
            ClientError::Transport(e) => ErrorDetail::transport(e.to_string()),
            ClientError::Timeout => ErrorDetail::timeout("no response within the configured timeout"),
            ClientError::CorrelationMismatch => ErrorDetail::validation("response correlation_id mismatch"),
        }
    }
}

/// Producer-side handle onto the bus. Owns no connection itself — it holds
/// an `Arc<dyn Broker>` so many `RelayClient`s (and the consumer worker
/// replying on the same process) can share one underlying connection. No
/// per-call state is retained across calls.
pub struct RelayClient {
    broker: Arc<dyn Broker>,
    prefix: String,
    env: String,
    service_name: String,
}

impl RelayClient {
    pub fn new(broker: Arc<dyn Broker>, prefix: impl Into<String>, env: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self { broker, prefix: prefix.into(), env: env.into(), service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn stamp_origin(&self, mut action: Action) -> Action {
        action.origin_service = Some(self.service_name.clone());
        action
    }

    /// Fire-and-forget dispatch: stamps `origin_service`, resolves the
    /// destination queue from the leading `<domain>` segment of
    /// `action.action_type`, and pushes. Returns as soon as the broker has
    /// accepted the push, with no expectation of any reply.
    pub async fn send_async(&self, action: Action) -> Result<(), ClientError> {
        let action = self.stamp_origin(action);
        let target_service = naming::target_service_from_action_type(&action.action_type);
        let queue = naming::action_queue_name(&self.prefix, &self.env, target_service);
        let payload = serde_json::to_vec(&action)?;
        self.broker.push(&queue, payload).await?;
        tracing::debug!(action_id = %action.action_id, action_type = %action.action_type, queue, "dispatched fire-and-forget action");
        Ok(())
    }

    /// Pseudo-synchronous dispatch: stamps `origin_service`, generates a
    /// `correlation_id` if the caller didn't supply one, points
    /// `callback_queue_name` at a freshly named response queue (leaving
    /// `callback_action_type` unset — that absence is what tells the
    /// responder this is a request/response call, not a callback one), then
    /// pushes and blocks on that response queue until `timeout` elapses.
    ///
    /// Always returns an `ActionResponse` — transport-level success does not
    /// imply business-level success; the caller reads `.success` itself. A
    /// pop timeout is synthesised locally as `ErrorType::Timeout`, never
    /// surfaced as a Rust-level error.
    pub async fn send_pseudo_sync(&self, mut action: Action, timeout: Duration) -> ActionResponse {
        let correlation_id = action.correlation_id.unwrap_or_else(Uuid::new_v4);
        action.correlation_id = Some(correlation_id);
        let trace_id = action.trace_id.unwrap_or(action.action_id);
        action.trace_id = Some(trace_id);
        let action = self.stamp_origin(action);

        let response_queue = naming::response_queue_name(&self.prefix, &self.env, &self.service_name, &action.action_type, &correlation_id);
        let mut action = action;
        action.callback_queue_name = Some(response_queue.clone());
        action.callback_action_type = None;

        match self.try_pseudo_sync(&action, &response_queue, timeout).await {
            Ok(response) => response,
            Err(err) => synthesize_error_response(&action, correlation_id, trace_id, err),
        }
    }

    async fn try_pseudo_sync(&self, action: &Action, response_queue: &str, timeout: Duration) -> Result<ActionResponse, ClientError> {
        let target_service = naming::target_service_from_action_type(&action.action_type);
        let action_queue = naming::action_queue_name(&self.prefix, &self.env, target_service);

        let payload = serde_json::to_vec(action)?;
        self.broker.push(&action_queue, payload).await?;
        tracing::debug!(action_id = %action.action_id, correlation_id = %action.correlation_id.unwrap(), response_queue, "dispatched pseudo-synchronous action, awaiting reply");

        let popped = self.broker.blocking_pop(response_queue, timeout).await?;
        // Best-effort cleanup regardless of outcome. The queue is already
        // empty after a successful pop; on a timeout this races the
        // responder's own TTL, which is the documented backstop.
        let _ = self.broker.delete(response_queue).await;

        let bytes = popped.ok_or(ClientError::Timeout)?;
        let response: ActionResponse = serde_json::from_slice(&bytes)?;
        response.validate().map_err(ClientError::InvalidAction)?;
        if response.correlation_id != action.correlation_id.unwrap() {
            return Err(ClientError::CorrelationMismatch);
        }
        Ok(response)
    }

    /// Async-with-callback dispatch: stamps `origin_service`, points both
    /// `callback_queue_name` and `callback_action_type` at the follow-up
    /// this client expects — the presence of both together is the wire
    /// signal that the responder must emit a new `Action`, not an
    /// `ActionResponse`, when it is done. Pushes and returns without
    /// waiting.
    ///
    /// `callback_event_name` and `callback_context` together name the
    /// callback queue (see [`naming::callback_queue_name`]); `context` is
    /// typically a task or request id scoping this particular call so
    /// concurrent callers awaiting the same `callback_event_name` don't
    /// collide on one queue.
    pub async fn send_async_with_callback(
        &self,
        mut action: Action,
        callback_event_name: &str,
        callback_action_type: impl Into<String>,
        callback_context: &str,
    ) -> Result<(), ClientError> {
        let callback_action_type = callback_action_type.into();
        if !relay_core::envelope::is_valid_action_type(&callback_action_type) {
            return Err(ClientError::InvalidAction(CoreError::InvalidActionType(callback_action_type)));
        }
        action = self.stamp_origin(action);
        if action.trace_id.is_none() {
            action.trace_id = Some(action.action_id);
        }

        let callback_queue = naming::callback_queue_name(&self.prefix, &self.env, &self.service_name, callback_event_name, callback_context);
        action.callback_queue_name = Some(callback_queue.clone());
        action.callback_action_type = Some(callback_action_type);

        let target_service = naming::target_service_from_action_type(&action.action_type);
        let action_queue = naming::action_queue_name(&self.prefix, &self.env, target_service);
        let payload = serde_json::to_vec(&action)?;
        self.broker.push(&action_queue, payload).await?;
        tracing::debug!(action_id = %action.action_id, callback_queue, "dispatched async action with callback");
        Ok(())
    }
}

fn synthesize_error_response(action: &Action, correlation_id: Uuid, trace_id: Uuid, err: ClientError) -> ActionResponse {
    let error_detail: ErrorDetail = err.into();
    tracing::warn!(action_id = %action.action_id, %correlation_id, error_type = %error_detail.error_type, "pseudo-synchronous call did not produce a response");
    ActionResponse::err(action.action_id, correlation_id, trace_id, error_detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_test::InMemoryBroker;
    use serde_json::json;

    fn client(broker: Arc<InMemoryBroker>) -> RelayClient {
        RelayClient::new(broker, "relay", "test", "caller-service")
    }

    #[tokio::test]
    async fn send_async_pushes_onto_the_deterministic_action_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("management.agent.get_config", json!({})).unwrap();
        client.send_async(action).await.unwrap();
        assert_eq!(broker.len("relay:test:management:actions:main"), 1);
    }

    #[tokio::test]
    async fn send_async_stamps_origin_service() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("management.agent.get_config", json!({})).unwrap();
        client.send_async(action).await.unwrap();
        let popped = broker.blocking_pop("relay:test:management:actions:main", Duration::from_millis(50)).await.unwrap().unwrap();
        let dispatched: Action = serde_json::from_slice(&popped).unwrap();
        assert_eq!(dispatched.origin_service.as_deref(), Some("caller-service"));
    }

    #[tokio::test]
    async fn send_pseudo_sync_times_out_when_nothing_replies() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("management.agent.get_config", json!({})).unwrap();
        let response = client.send_pseudo_sync(action, Duration::from_millis(50)).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().error_type, relay_core::ErrorType::Timeout);
    }

    #[tokio::test]
    async fn send_pseudo_sync_receives_a_reply_pushed_onto_the_response_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("management.agent.get_config", json!({})).unwrap();
        let action_id = action.action_id;

        let responder_broker = broker.clone();
        let responder = tokio::spawn(async move {
            // Stands in for the consumer worker: pop the request, learn the
            // response queue the same way it would, reply on it.
            loop {
                if let Some(bytes) = responder_broker
                    .blocking_pop("relay:test:management:actions:main", Duration::from_millis(200))
                    .await
                    .unwrap()
                {
                    let received: Action = serde_json::from_slice(&bytes).unwrap();
                    let response = ActionResponse::reply_ok(&received, json!({"ok": true}));
                    responder_broker
                        .push(received.callback_queue_name.as_deref().unwrap(), serde_json::to_vec(&response).unwrap())
                        .await
                        .unwrap();
                    break;
                }
            }
        });

        let response = client.send_pseudo_sync(action, Duration::from_secs(2)).await;
        responder.await.unwrap();
        assert_eq!(response.action_id, action_id);
        assert!(response.success);
    }

    #[tokio::test]
    async fn send_pseudo_sync_rejects_a_response_with_mismatched_correlation_id() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("management.agent.get_config", json!({})).unwrap();

        let responder_broker = broker.clone();
        let responder = tokio::spawn(async move {
            loop {
                if let Some(bytes) = responder_broker
                    .blocking_pop("relay:test:management:actions:main", Duration::from_millis(200))
                    .await
                    .unwrap()
                {
                    let received: Action = serde_json::from_slice(&bytes).unwrap();
                    // Reply with a deliberately wrong correlation_id.
                    let bogus = ActionResponse::ok(received.action_id, Uuid::new_v4(), received.action_id, json!({}));
                    responder_broker
                        .push(received.callback_queue_name.as_deref().unwrap(), serde_json::to_vec(&bogus).unwrap())
                        .await
                        .unwrap();
                    break;
                }
            }
        });

        let response = client.send_pseudo_sync(action, Duration::from_secs(2)).await;
        responder.await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.unwrap().error_type, relay_core::ErrorType::Validation);
    }

    #[tokio::test]
    async fn send_pseudo_sync_rejects_a_response_violating_the_root_invariant() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("management.agent.get_config", json!({})).unwrap();

        let responder_broker = broker.clone();
        let responder = tokio::spawn(async move {
            loop {
                if let Some(bytes) = responder_broker
                    .blocking_pop("relay:test:management:actions:main", Duration::from_millis(200))
                    .await
                    .unwrap()
                {
                    let received: Action = serde_json::from_slice(&bytes).unwrap();
                    // `success:true` with an `error` present — violates the
                    // root invariant; never constructible through `ok`/`err`,
                    // but a corrupted or malicious responder could still push it.
                    let malformed = json!({
                        "action_id": received.action_id,
                        "correlation_id": received.correlation_id,
                        "trace_id": received.trace_id.unwrap_or(received.action_id),
                        "success": true,
                        "timestamp": "2026-01-01T00:00:00Z",
                        "error": {"error_type": "Internal", "message": "should not coexist with success"},
                    });
                    responder_broker
                        .push(received.callback_queue_name.as_deref().unwrap(), serde_json::to_vec(&malformed).unwrap())
                        .await
                        .unwrap();
                    break;
                }
            }
        });

        let response = client.send_pseudo_sync(action, Duration::from_secs(2)).await;
        responder.await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.unwrap().error_type, relay_core::ErrorType::Validation);
    }

    #[tokio::test]
    async fn send_async_with_callback_rejects_malformed_callback_action_type() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker);
        let action = Action::new("management.agent.get_config", json!({})).unwrap();
        let result = client.send_async_with_callback(action, "embed_done", "not-dotted", "task-1").await;
        assert!(matches!(result, Err(ClientError::InvalidAction(_))));
    }

    #[tokio::test]
    async fn send_async_with_callback_stamps_callback_fields_on_the_action() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = client(broker.clone());
        let action = Action::new("embed.generate", json!({"texts": ["hi"]})).unwrap();
        client
            .send_async_with_callback(action, "embed_done", "ingest.embeddings_ready", "task-7")
            .await
            .unwrap();

        let popped = broker.blocking_pop("relay:test:embed:actions:main", Duration::from_millis(50)).await.unwrap().unwrap();
        let dispatched: Action = serde_json::from_slice(&popped).unwrap();
        assert_eq!(dispatched.callback_action_type.as_deref(), Some("ingest.embeddings_ready"));
        assert_eq!(
            dispatched.callback_queue_name.as_deref(),
            Some("relay:test:caller-service:callbacks:embed_done:task-7")
        );
    }
}
