//! Queue Naming Authority.
//!
//! Every queue name used by the message bus is derived deterministically
//! from a small set of inputs so that producers and consumers that never
//! directly coordinate still agree on where to push and pop. No component
//! outside this module concatenates queue name strings — `relay-client` and
//! `relay-worker` call only the functions below.
//!
//! The canonical forms, stable across processes and languages:
//!
//! ```text
//! action queue:   {prefix}:{env}:{service}:actions:main
//! response queue: {prefix}:{env}:{client_service}:responses:{sanitised_action_type}:{correlation_id}
//! callback queue: {prefix}:{env}:{client_service}:callbacks:{event_name}:{context}
//! ```
//!
//! A service has exactly one action queue, named `main`. Routing between
//! action types happens inside the consumer's handler registry, not in the
//! queue namespace — adding a new action type never requires a new queue.

const SEP: char = ':';

/// Replaces the dots in a dotted `action_type` with underscores so the
/// result is safe to splice into a colon-delimited queue name without
/// ambiguity between `action_type` segment boundaries and name segment
/// boundaries.
pub fn sanitise_action_type(action_type: &str) -> String {
    action_type.replace('.', "_")
}

/// Extracts the leading `<domain>` segment of a dotted `action_type` — by
/// convention, the name of the service that owns and handles it. Producers
/// use this to resolve a destination without a separate routing table.
pub fn target_service_from_action_type(action_type: &str) -> &str {
    action_type.split('.').next().unwrap_or(action_type)
}

/// Builds the name of the single action queue a service listens on.
pub fn action_queue_name(prefix: &str, env: &str, service: &str) -> String {
    [prefix, env, service, "actions", "main"].join(&SEP.to_string())
}

/// Builds the name of the ephemeral response queue for a single
/// pseudo-synchronous call. Unique per `(client_service, action_type,
/// correlation_id)` triple so that concurrent in-flight calls for the same
/// action type never collide on the same queue.
pub fn response_queue_name(
    prefix: &str,
    env: &str,
    client_service: &str,
    action_type: &str,
    correlation_id: &uuid::Uuid,
) -> String {
    [
        prefix,
        env,
        client_service,
        "responses",
        &sanitise_action_type(action_type),
        &correlation_id.to_string(),
    ]
    .join(&SEP.to_string())
}

/// Builds the name of the queue a callback-pattern follow-up action is
/// pushed onto. `event_name` names the kind of thing being awaited (e.g.
/// `"embed_done"`) and `context` is a caller-chosen identifier scoping it to
/// one particular call (e.g. a task id) — together they let one client
/// service await several distinct callbacks of the same kind concurrently.
pub fn callback_queue_name(prefix: &str, env: &str, client_service: &str, event_name: &str, context: &str) -> String {
    [prefix, env, client_service, "callbacks", event_name, context].join(&SEP.to_string())
}
