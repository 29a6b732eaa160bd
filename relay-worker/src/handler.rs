//! Handler Abstraction.
//!
//! A handler is a callable `(Action, ExecutionContext) -> Result<Option<Value>, ErrorDetail>`.
//! Three conventional specialisations exist; none is enforced by the type
//! system as a base class — each is expressed as a small, composable shape
//! instead of a hierarchy:
//!
//! - **Stateless action handler**: any closure matching [`ActionHandler`].
//! - **Callback-emitting handler**: a stateless handler that closes over a
//!   [`relay_client::RelayClient`] to originate further fire-and-forget
//!   actions as a side effect — no separate trait needed.
//! - **Context-bearing handler**: [`ContextHandler`], a decorator-like
//!   wrapper around a read-modify-write closure, not a base class.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relay_core::{ErrorDetail, ExecutionContext};
use relay_transport::Broker;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Result type every handler returns. The error half is the wire
/// [`ErrorDetail`] itself — handlers raise business errors with
/// `ErrorDetail::not_found(...)`, `ErrorDetail::validation(...)`, etc., the
/// same constructors the worker uses for its own `Unsupported` and
/// `Internal` errors, so there is exactly one error vocabulary from handler
/// to wire. `Ok(None)` is an implicit empty result (fire-and-forget callers
/// never see it; pseudo-sync callers get `ActionResponse{data: None}`).
pub type HandlerResult = Result<Option<Value>, ErrorDetail>;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The user-provided callable invoked per action. Implemented for any
/// `Fn(Action, ExecutionContext) -> Future<Output = HandlerResult>` closure,
/// so a plain `async fn`/closure is already a valid handler — no derive, no
/// trait object boilerplate at the call site.
pub trait ActionHandler: Send + Sync {
    fn call(&self, action: relay_core::Action, ctx: ExecutionContext) -> BoxFuture<HandlerResult>;
}

impl<F, Fut> ActionHandler for F
where
    F: Fn(relay_core::Action, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, action: relay_core::Action, ctx: ExecutionContext) -> BoxFuture<HandlerResult> {
        Box::pin(self(action, ctx))
    }
}

/// An already-boxed handler, the shape stored in the [`crate::registry::HandlerRegistry`].
pub type BoxedHandler = Arc<dyn ActionHandler>;

/// Context-bearing handler: wraps a read-modify-write cycle against a
/// context object the handler family owns, keyed by a handler-computed key
/// in the broker's `get`/`set` store.
///
/// The transport provides no locking around `get`/`set` — two invocations
/// keyed on the same `context_key` race unless the handler itself
/// serialises access (e.g. by confining writers for a key to one worker
/// instance, or by using a broker-level check-and-set if the concrete
/// `Broker` impl exposes one). This wrapper does not attempt to paper over
/// that; it is documented, not solved, here.
type ContextKeyFn = Arc<dyn Fn(&relay_core::Action) -> String + Send + Sync>;
#[allow(clippy::type_complexity)]
type ContextHandleFn<S> = Arc<dyn Fn(Option<S>, Value) -> Result<(Option<S>, Option<Value>), ErrorDetail> + Send + Sync>;

pub struct ContextHandler<S> {
    broker: Arc<dyn Broker>,
    context_key: ContextKeyFn,
    handle: ContextHandleFn<S>,
}

impl<S> ContextHandler<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        broker: Arc<dyn Broker>,
        context_key: impl Fn(&relay_core::Action) -> String + Send + Sync + 'static,
        handle: impl Fn(Option<S>, Value) -> Result<(Option<S>, Option<Value>), ErrorDetail> + Send + Sync + 'static,
    ) -> Self {
        Self { broker, context_key: Arc::new(context_key), handle: Arc::new(handle) }
    }
}

impl<S> ActionHandler for ContextHandler<S>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn call(&self, action: relay_core::Action, _ctx: ExecutionContext) -> BoxFuture<HandlerResult> {
        let broker = self.broker.clone();
        let key = (self.context_key)(&action);
        let handle = self.handle.clone();
        Box::pin(async move {
            let current: Option<S> = match broker.get(&key).await {
                Ok(Some(bytes)) => Some(
                    serde_json::from_slice(&bytes)
                        .map_err(|e| ErrorDetail::internal(format!("corrupt context at {key}: {e}")))?,
                ),
                Ok(None) => None,
                Err(e) => return Err(ErrorDetail::transport(e.to_string())),
            };
            let (updated, response) = handle(current, action.data.clone())?;
            match updated {
                Some(state) => {
                    let bytes = serde_json::to_vec(&state).map_err(|e| ErrorDetail::internal(e.to_string()))?;
                    broker.set(&key, bytes).await.map_err(|e| ErrorDetail::transport(e.to_string()))?;
                }
                None => {
                    broker.delete(&key).await.map_err(|e| ErrorDetail::transport(e.to_string()))?;
                }
            }
            Ok(response)
        })
    }
}
