//! Consumer Worker: the long-running receive loop for one service.
//!
//! A worker instance is single-threaded and cooperative — it serialises
//! message handling on its own event loop, one action at a time. A service
//! runs multiple worker instances (same or different processes) bound to
//! the same action queue to get competing-consumer throughput; the
//! broker's atomic blocking pop is what makes that safe without any
//! additional coordination in this crate.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{naming, Action, ActionBuilder, ActionResponse, ErrorDetail, ExecutionContext, TenantTierResolver};
use relay_transport::Broker;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::handler::BoxFuture;
use crate::registry::HandlerRegistry;

/// How long a single `blocking_pop` call on the action queue waits before
/// returning control to the loop so a stop signal gets observed promptly.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Backoff after a broker error before retrying the pop loop. Transient
/// broker outages are expected and must never cause the worker to exit.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

type InitHook = Arc<dyn Fn() -> BoxFuture<()> + Send + Sync>;

/// What the worker owes the caller once a handler finishes, derived once
/// from the inbound envelope's callback fields (spec §4.4 step 6).
enum Intent {
    /// `callback_queue_name` absent: caller isn't waiting on anything.
    FireAndForget,
    /// `callback_queue_name` present, `callback_action_type` absent: caller
    /// is blocked on a pseudo-synchronous response queue.
    PseudoSync { response_queue: String },
    /// Both present: caller expects a new `Action` of type
    /// `callback_action_type`, not an `ActionResponse`.
    Callback { queue: String, callback_action_type: String },
}

impl Intent {
    fn from_action(action: &Action) -> Self {
        match (&action.callback_queue_name, &action.callback_action_type) {
            (None, _) => Intent::FireAndForget,
            (Some(queue), None) => Intent::PseudoSync { response_queue: queue.clone() },
            (Some(queue), Some(callback_action_type)) => {
                Intent::Callback { queue: queue.clone(), callback_action_type: callback_action_type.clone() }
            }
        }
    }
}

struct InFlight {
    abort: tokio::task::AbortHandle,
    done: oneshot::Receiver<()>,
}

struct WorkerInner {
    broker: Arc<dyn Broker>,
    action_queue: String,
    registry: HandlerRegistry,
    producer: Option<relay_client::RelayClient>,
    tenant_tier_resolver: Option<TenantTierResolver>,
    response_queue_ttl: Duration,
    on_initialise: Option<InitHook>,
    initialised: OnceCell<()>,
    cancel: CancellationToken,
    in_flight: Mutex<Option<InFlight>>,
}

/// The long-running consumer loop for one service. Cheap to clone — every
/// clone shares the same broker connection, handler registry, and
/// cancellation token, which is how the receive loop hands a dispatch off
/// to its own spawned task while still being reachable from `stop()`.
#[derive(Clone)]
pub struct ConsumerWorker(Arc<WorkerInner>);

impl ConsumerWorker {
    fn builder_into(
        broker: Arc<dyn Broker>,
        action_queue: String,
        registry: HandlerRegistry,
        producer: Option<relay_client::RelayClient>,
        tenant_tier_resolver: Option<TenantTierResolver>,
        response_queue_ttl: Duration,
        on_initialise: Option<InitHook>,
    ) -> Self {
        Self(Arc::new(WorkerInner {
            broker,
            action_queue,
            registry,
            producer,
            tenant_tier_resolver,
            response_queue_ttl,
            on_initialise,
            initialised: OnceCell::new(),
            cancel: CancellationToken::new(),
            in_flight: Mutex::new(None),
        }))
    }

    /// Runs `initialise()` (at most once, even if called concurrently from
    /// more than one task) then enters the receive loop. Returns once
    /// `stop()` has been called and the loop has observed it.
    pub async fn run(&self) {
        self.ensure_initialised().await;
        tracing::info!(queue = %self.0.action_queue, "consumer worker started");

        loop {
            if self.0.cancel.is_cancelled() {
                break;
            }

            let popped = tokio::select! {
                biased;
                _ = self.0.cancel.cancelled() => break,
                res = self.0.broker.blocking_pop(&self.0.action_queue, RECEIVE_POLL_INTERVAL) => res,
            };

            let bytes = match popped {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(error = %err, queue = %self.0.action_queue, "broker error while polling action queue, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                        _ = self.0.cancel.cancelled() => break,
                    }
                    continue;
                }
            };

            self.dispatch_one(bytes).await;
        }

        tracing::info!(queue = %self.0.action_queue, "consumer worker stopped");
    }

    /// Spawns the dispatch of one popped envelope as its own task so
    /// `stop()` can bound how long it waits for the task to finish, then
    /// awaits that task before returning to the pop loop — a worker
    /// processes actions one at a time.
    async fn dispatch_one(&self, bytes: Vec<u8>) {
        let this = self.clone();
        let (done_tx, done_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _send_done_on_drop = DoneGuard(Some(done_tx));
            this.handle_envelope(bytes).await;
        });
        *self.0.in_flight.lock().await = Some(InFlight { abort: task.abort_handle(), done: done_rx });
        let _ = task.await;
        *self.0.in_flight.lock().await = None;
    }

    async fn ensure_initialised(&self) {
        self.0
            .initialised
            .get_or_init(|| async {
                if let Some(hook) = &self.0.on_initialise {
                    hook().await;
                }
            })
            .await;
    }

    /// Sets the stop flag, waits up to `grace_period` for the in-flight
    /// action (if any) to finish on its own, then cancels it. The caller
    /// sees the usual consequence of a dropped handler: a timeout on
    /// pattern 2, no callback on pattern 3.
    pub async fn stop(&self, grace_period: Duration) {
        self.0.cancel.cancel();
        let in_flight = self.0.in_flight.lock().await.take();
        let Some(InFlight { abort, done }) = in_flight else { return };
        if tokio::time::timeout(grace_period, done).await.is_err() {
            tracing::warn!("in-flight action exceeded shutdown grace period, cancelling");
            abort.abort();
        }
    }

    async fn handle_envelope(&self, bytes: Vec<u8>) {
        let action: Action = match serde_json::from_slice(&bytes) {
            Ok(action) => action,
            Err(err) => {
                // The envelope is gone: at-most-once for malformed
                // messages. Callback fields themselves may be corrupted,
                // so no response is attempted.
                tracing::error!(error = %err, "discarding malformed action envelope");
                return;
            }
        };

        let ctx = ExecutionContext::from_action(&action, self.0.tenant_tier_resolver.as_ref());
        let span = ctx.span.clone();
        let _entered = span.enter();

        let intent = Intent::from_action(&action);
        let handler = match self.0.registry.get(&action.action_type) {
            Some(handler) => handler.clone(),
            None => {
                let error = ErrorDetail::unsupported(format!("no handler registered for action_type '{}'", action.action_type));
                tracing::warn!(action_type = %action.action_type, "rejecting action with no registered handler");
                self.emit_failure(&action, intent, error).await;
                return;
            }
        };

        match handler.call(action.clone(), ctx).await {
            Ok(result) => self.emit_success(&action, intent, result).await,
            Err(error) => {
                tracing::error!(action_id = %action.action_id, error_type = %error.error_type, message = %error.message, "handler failed");
                self.emit_failure(&action, intent, error).await;
            }
        }
    }

    async fn emit_success(&self, action: &Action, intent: Intent, result: Option<Value>) {
        match intent {
            Intent::FireAndForget => {}
            Intent::PseudoSync { response_queue } => {
                let correlation_id = action.correlation_id.unwrap_or(action.action_id);
                let trace_id = action.trace_id.unwrap_or(action.action_id);
                let response = ActionResponse::ok(action.action_id, correlation_id, trace_id, result.unwrap_or(Value::Null));
                self.push_response(&response_queue, &response).await;
            }
            Intent::Callback { queue, callback_action_type } => {
                self.push_callback(action, &queue, &callback_action_type, result.unwrap_or(Value::Null)).await;
            }
        }
    }

    async fn emit_failure(&self, action: &Action, intent: Intent, error: ErrorDetail) {
        match intent {
            Intent::FireAndForget => {
                // Caller isn't waiting on a reply; alerting is via
                // telemetry, not messages.
            }
            Intent::PseudoSync { response_queue } => {
                let correlation_id = action.correlation_id.unwrap_or(action.action_id);
                let trace_id = action.trace_id.unwrap_or(action.action_id);
                let response = ActionResponse::err(action.action_id, correlation_id, trace_id, error);
                self.push_response(&response_queue, &response).await;
            }
            Intent::Callback { queue, callback_action_type } => {
                let error_action_type = format!("{callback_action_type}.error");
                let data = serde_json::json!({
                    "error": error,
                    "original_action_id": action.action_id,
                });
                self.push_callback(action, &queue, &error_action_type, data).await;
            }
        }
    }

    async fn push_response(&self, queue: &str, response: &ActionResponse) {
        let bytes = match serde_json::to_vec(response) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialise response");
                return;
            }
        };
        if let Err(err) = self.0.broker.push(queue, bytes).await {
            tracing::error!(error = %err, queue, "failed to push response");
            return;
        }
        if let Err(err) = self.0.broker.expire(queue, self.0.response_queue_ttl).await {
            tracing::warn!(error = %err, queue, "failed to set TTL on response queue");
        }
    }

    async fn push_callback(&self, original: &Action, queue: &str, callback_action_type: &str, data: Value) {
        let mut builder = ActionBuilder::new(callback_action_type, data);
        if let Some(correlation_id) = original.correlation_id {
            builder = builder.correlation_id(correlation_id);
        }
        builder = builder.trace_id(original.trace_id.unwrap_or(original.action_id));
        if let Some(service) = self.0.producer.as_ref().map(|p| p.service_name().to_string()) {
            builder = builder.origin_service(service);
        }
        let callback_action = match builder.build() {
            Ok(action) => action,
            Err(err) => {
                tracing::error!(error = %err, callback_action_type, "failed to build callback action");
                return;
            }
        };
        let bytes = match serde_json::to_vec(&callback_action) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialise callback action");
                return;
            }
        };
        if let Err(err) = self.0.broker.push(queue, bytes).await {
            tracing::error!(error = %err, queue, "failed to push callback action");
        }
    }
}

struct DoneGuard(Option<oneshot::Sender<()>>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Builds a [`ConsumerWorker`]: the explicit registration point for every
/// action type this service handles (spec Design Notes §9 — a builder, not
/// a discovery mechanism).
pub struct WorkerBuilder {
    broker: Arc<dyn Broker>,
    prefix: String,
    env: String,
    service_name: String,
    registry: HandlerRegistry,
    producer: Option<relay_client::RelayClient>,
    tenant_tier_resolver: Option<TenantTierResolver>,
    response_queue_ttl: Duration,
    on_initialise: Option<InitHook>,
}

impl WorkerBuilder {
    pub fn new(broker: Arc<dyn Broker>, prefix: impl Into<String>, env: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            broker,
            prefix: prefix.into(),
            env: env.into(),
            service_name: service_name.into(),
            registry: HandlerRegistry::new(),
            producer: None,
            tenant_tier_resolver: None,
            response_queue_ttl: Duration::from_secs(300),
            on_initialise: None,
        }
    }

    /// Registers `handler` for `action_type`. The only way to wire up
    /// dispatch — there is no scanning for conventionally-named methods.
    pub fn handler(mut self, action_type: impl Into<String>, handler: impl crate::handler::ActionHandler + 'static) -> Self {
        self.registry.register(action_type, handler);
        self
    }

    /// Attaches a [`relay_client::RelayClient`] so callback-pattern
    /// follow-up actions are stamped with this service's own name as
    /// `origin_service`, and so handlers that need to originate further
    /// fire-and-forget actions (the callback-emitting handler shape) have
    /// one available.
    pub fn producer(mut self, producer: relay_client::RelayClient) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn tenant_tier_resolver(mut self, resolver: TenantTierResolver) -> Self {
        self.tenant_tier_resolver = Some(resolver);
        self
    }

    pub fn response_queue_ttl(mut self, ttl: Duration) -> Self {
        self.response_queue_ttl = ttl;
        self
    }

    /// Registers a subclass-style initialisation hook, run at most once,
    /// the first time `run()` is called, even under concurrent callers.
    pub fn on_initialise<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_initialise = Some(Arc::new(move || Box::pin(hook())));
        self
    }

    pub fn build(self) -> ConsumerWorker {
        let action_queue = naming::action_queue_name(&self.prefix, &self.env, &self.service_name);
        ConsumerWorker::builder_into(
            self.broker,
            action_queue,
            self.registry,
            self.producer,
            self.tenant_tier_resolver,
            self.response_queue_ttl,
            self.on_initialise,
        )
    }
}
