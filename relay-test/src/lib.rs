//! An in-process [`Broker`] backed by `VecDeque`s behind a `DashMap`, used
//! by every other crate's test suite so unit tests don't need a live Redis
//! instance. Semantics mirror `relay-transport-redis::RedisBroker` closely
//! enough that a scenario test written against one behaves the same against
//! the other — FIFO per queue, blocking pop with a timeout, explicit
//! delete/expire.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use relay_transport::{Broker, TransportError};
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
pub struct InMemoryBroker {
    queues: DashMap<String, VecDeque<Vec<u8>>>,
    notify: DashMap<String, Arc<Notify>>,
    values: DashMap<String, Vec<u8>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: current length of `queue`, without popping anything.
    pub fn len(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    fn notifier_for(&self, queue: &str) -> Arc<Notify> {
        self.notify.entry(queue.to_string()).or_insert_with(|| Arc::new(Notify::new())).clone()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.queues.entry(queue.to_string()).or_default().push_back(payload);
        self.notifier_for(queue).notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking the queue: `Notify::notified()`
            // captures the current notification state at creation time, so a
            // push-and-notify racing in between the check and the await below
            // can never be missed the way it would be if we waited to create
            // this future until after finding the queue empty.
            let notified = self.notifier_for(queue).notified();
            if let Some(mut entry) = self.queues.get_mut(queue) {
                if let Some(payload) = entry.pop_front() {
                    return Ok(Some(payload));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn delete(&self, queue: &str) -> Result<(), TransportError> {
        self.queues.remove(queue);
        Ok(())
    }

    async fn expire(&self, _queue: &str, _ttl: Duration) -> Result<(), TransportError> {
        // No background reaper in the in-memory harness: tests assert on
        // explicit `delete`, not on TTL expiry.
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), TransportError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
