use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, ErrorDetail};

/// A request travelling from a producer to a consumer over the bus.
///
/// `action_id` and `timestamp` are assigned once, at construction, and never
/// mutated afterwards — retries and redeliveries carry the same `action_id`
/// so a handler can de-duplicate if it needs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: Uuid,
    pub action_type: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_service: Option<String>,

    /// Present on pseudo-synchronous and callback-style calls; absent on
    /// plain fire-and-forget dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Propagated end-to-end for distributed tracing; generated fresh at the
    /// root of a call chain if the producer does not supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,

    /// Queue a callback-style follow-up action should be pushed onto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_queue_name: Option<String>,
    /// `action_type` the handler should stamp on the callback follow-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_action_type: Option<String>,

    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Action {
    /// Builds a new root action (no correlation, no inherited trace). Use
    /// [`ActionBuilder`] directly for anything beyond the required fields.
    pub fn new(action_type: impl Into<String>, data: Value) -> Result<Self, CoreError> {
        ActionBuilder::new(action_type, data).build()
    }

    pub fn builder(action_type: impl Into<String>, data: Value) -> ActionBuilder {
        ActionBuilder::new(action_type, data)
    }

    pub fn is_callback(&self) -> bool {
        self.callback_queue_name.is_some()
    }

    pub fn is_pseudo_sync(&self) -> bool {
        self.correlation_id.is_some() && self.callback_queue_name.is_none()
    }
}

/// Builder for [`Action`]. `action_type` is validated against the dotted
/// `<domain>.<entity>.<verb>` format at `build()` time — constructing an
/// `Action` with a malformed type is a programmer error to be caught at the
/// producer boundary, not deferred to the consumer.
pub struct ActionBuilder {
    action_type: String,
    data: Value,
    tenant_id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    origin_service: Option<String>,
    correlation_id: Option<Uuid>,
    trace_id: Option<Uuid>,
    callback_queue_name: Option<String>,
    callback_action_type: Option<String>,
    metadata: HashMap<String, Value>,
}

impl ActionBuilder {
    pub fn new(action_type: impl Into<String>, data: Value) -> Self {
        Self {
            action_type: action_type.into(),
            data,
            tenant_id: None,
            user_id: None,
            session_id: None,
            origin_service: None,
            correlation_id: None,
            trace_id: None,
            callback_queue_name: None,
            callback_action_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn tenant_id(mut self, v: impl Into<String>) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    pub fn user_id(mut self, v: impl Into<String>) -> Self {
        self.user_id = Some(v.into());
        self
    }

    pub fn session_id(mut self, v: impl Into<String>) -> Self {
        self.session_id = Some(v.into());
        self
    }

    pub fn origin_service(mut self, v: impl Into<String>) -> Self {
        self.origin_service = Some(v.into());
        self
    }

    pub fn correlation_id(mut self, v: Uuid) -> Self {
        self.correlation_id = Some(v);
        self
    }

    pub fn trace_id(mut self, v: Uuid) -> Self {
        self.trace_id = Some(v);
        self
    }

    pub fn callback(mut self, queue_name: impl Into<String>, action_type: impl Into<String>) -> Self {
        self.callback_queue_name = Some(queue_name.into());
        self.callback_action_type = Some(action_type.into());
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn build(self) -> Result<Action, CoreError> {
        if !is_valid_action_type(&self.action_type) {
            return Err(CoreError::InvalidActionType(self.action_type));
        }
        Ok(Action {
            action_id: Uuid::new_v4(),
            action_type: self.action_type,
            timestamp: Utc::now(),
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            session_id: self.session_id,
            origin_service: self.origin_service,
            correlation_id: self.correlation_id,
            trace_id: self.trace_id,
            callback_queue_name: self.callback_queue_name,
            callback_action_type: self.callback_action_type,
            data: self.data,
            metadata: self.metadata,
        })
    }
}

/// A reply travelling from a consumer back to a producer over a
/// pseudo-synchronous call's ephemeral response queue.
///
/// The root invariant — `success == true` iff `error.is_none()` — is
/// enforced at construction: there is no way to build an inconsistent
/// `ActionResponse` through [`ActionResponse::ok`] / [`ActionResponse::err`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action_id: Uuid,
    pub correlation_id: Uuid,
    pub trace_id: Uuid,
    pub success: bool,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ActionResponse {
    pub fn ok(action_id: Uuid, correlation_id: Uuid, trace_id: Uuid, data: Value) -> Self {
        Self {
            action_id,
            correlation_id,
            trace_id,
            success: true,
            timestamp: Utc::now(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(action_id: Uuid, correlation_id: Uuid, trace_id: Uuid, error: ErrorDetail) -> Self {
        Self {
            action_id,
            correlation_id,
            trace_id,
            success: false,
            timestamp: Utc::now(),
            data: None,
            error: Some(error),
        }
    }

    /// Replies to `action`, borrowing its `action_id`/`correlation_id`/`trace_id`.
    ///
    /// Panics if `action` has no `correlation_id` — building a response to an
    /// action that was never pseudo-synchronous is a caller bug, not a
    /// recoverable runtime condition.
    pub fn reply_ok(action: &Action, data: Value) -> Self {
        Self::ok(
            action.action_id,
            action.correlation_id.expect("reply_ok requires a correlation_id on the originating action"),
            action.trace_id.unwrap_or(action.action_id),
            data,
        )
    }

    pub fn reply_err(action: &Action, error: ErrorDetail) -> Self {
        Self::err(
            action.action_id,
            action.correlation_id.expect("reply_err requires a correlation_id on the originating action"),
            action.trace_id.unwrap_or(action.action_id),
            error,
        )
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.success == self.error.is_some() {
            return Err(CoreError::InconsistentResponse);
        }
        Ok(())
    }
}

/// Checks the `<domain>.<entity>.<verb>` dotted format against
/// `^[a-z][a-z0-9]*(\.[a-z][a-z0-9_]*)+$`: lowercase segments joined by at
/// least one dot, each starting with a letter. The leading `<domain>`
/// segment additionally excludes underscores — it is the one segment
/// `sanitise_action_type`'s dot-to-underscore replacement never touches, so
/// keeping it underscore-free is what makes that replacement unambiguous
/// (see `naming::sanitise_action_type`). No regex crate — the grammar is
/// simple enough to walk by hand.
pub fn is_valid_action_type(action_type: &str) -> bool {
    let mut segments = action_type.split('.');
    let Some(domain) = segments.next() else { return false };
    if !is_valid_domain_segment(domain) {
        return false;
    }
    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        return false;
    }
    rest.iter().all(|segment| is_valid_segment(segment))
}

/// The leading `<domain>` segment: `[a-z][a-z0-9]*`, no underscores.
fn is_valid_domain_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Any non-leading segment: `[a-z][a-z0-9_]*`, underscores allowed.
fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
