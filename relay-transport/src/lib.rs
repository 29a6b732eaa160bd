//! The `Broker` abstraction: the one seam between the messaging core and a
//! concrete transport backend.
//!
//! Mirrors the split the rest of this workspace's producer/consumer stack
//! uses for its own pluggable backends — one trait crate, one crate per
//! concrete backend. `relay-transport-redis` is the only backend shipped
//! today, but nothing above this trait knows that.

use std::time::Duration;

use async_trait::async_trait;

/// Errors a [`Broker`] implementation can surface. Deliberately narrow and
/// backend-agnostic — a concrete backend's own richer error type converts
/// into this one at the trait boundary, the way `relay-core::ErrorType`
/// later folds `TransportError` into its own `Transport` variant.
#[derive(Debug)]
pub enum TransportError {
    /// The backend connection is unavailable or the operation could not be
    /// completed against it (connection reset, backend unreachable, ...).
    Unavailable(String),
    /// The backend rejected the operation itself (bad command, auth failure).
    Rejected(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Unavailable(msg) => write!(f, "broker unavailable: {msg}"),
            TransportError::Rejected(msg) => write!(f, "broker rejected operation: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A message bus capable of pushing bytes onto a named queue and popping
/// them back off, with no opinion on what the bytes mean.
///
/// Implementations must guarantee that `push` is atomic with respect to
/// concurrent `blocking_pop` callers (competing consumers never observe a
/// partial or duplicated push) and that `blocking_pop` across multiple
/// consumer instances delivers each pushed message to exactly one of them.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Atomically appends `payload` to `queue`, creating it if absent.
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Pops the oldest payload off `queue`, blocking up to `timeout` if the
    /// queue is currently empty. Returns `Ok(None)` on timeout, never an
    /// error — a timeout is an expected outcome, not a transport failure.
    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Removes `queue` entirely. Used to clean up an ephemeral response
    /// queue once a pseudo-synchronous call has been answered or has timed
    /// out, so abandoned queues don't accumulate in the backend.
    async fn delete(&self, queue: &str) -> Result<(), TransportError>;

    /// Sets a time-to-live on `queue` so it is reclaimed by the backend even
    /// if `delete` is never called — the backstop for response queues whose
    /// caller crashed before cleaning up after itself.
    async fn expire(&self, queue: &str, ttl: Duration) -> Result<(), TransportError>;

    /// Reads the current value stored at `key`, or `None` if unset.
    ///
    /// Used for context-bearing handlers' read-modify-write state, not for
    /// queue traffic. The broker provides no locking around `get`/`set` —
    /// callers that need read-modify-write atomicity must arrange it
    /// themselves (e.g. by confining writers for a given key to one
    /// consumer worker, or accepting last-write-wins).
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// Writes `value` to `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), TransportError>;
}
