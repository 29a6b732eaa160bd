//! Redis-backed [`Broker`]. Queues are plain Redis lists: `LPUSH` on the
//! producing side, `BRPOP` on the consuming side, giving FIFO delivery and
//! atomic competing-consumer semantics for free from the list type itself.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use relay_transport::{Broker, TransportError};

/// Thin wrapper over a [`ConnectionManager`], which already reconnects and
/// multiplexes under the hood — `RedisBroker` itself holds no retry logic.
#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    /// Connects to `redis_url` (e.g. `redis://127.0.0.1:6379`). Fails fast if
    /// the initial connection cannot be established; reconnection after that
    /// point is handled transparently by the underlying connection manager.
    pub async fn connect(redis_url: &str) -> Result<Self, TransportError> {
        let client = Client::open(redis_url).map_err(|e| TransportError::Rejected(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, payload)
            .await
            .map_err(to_transport_error)
    }

    async fn blocking_pop(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let mut conn = self.conn.clone();
        // BRPOP's timeout is seconds as an f64; zero means "block forever",
        // which this trait never wants, so a sub-second remainder still
        // rounds up to at least one second rather than silently blocking
        // indefinitely.
        let timeout_secs = timeout.as_secs_f64().max(1.0);
        let result: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(to_transport_error)?;
        Ok(result.map(|(_key, payload)| payload))
    }

    async fn delete(&self, queue: &str) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(queue).await.map_err(to_transport_error)
    }

    async fn expire(&self, queue: &str, ttl: Duration) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(queue, ttl.as_secs() as i64)
            .await
            .map_err(to_transport_error)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(to_transport_error)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(to_transport_error)
    }
}

fn to_transport_error(err: redis::RedisError) -> TransportError {
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        TransportError::Unavailable(err.to_string())
    } else {
        TransportError::Rejected(err.to_string())
    }
}
