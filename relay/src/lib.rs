//! Single-dependency entry point for a service that wants to join the
//! relay bus: add `relay` instead of the individual `relay-core` /
//! `relay-transport` / `relay-client` / `relay-worker` / `relay-config` /
//! `relay-telemetry` crates.
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay::{RelayConfig, RelayClient, WorkerBuilder, RedisBroker};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::load()?;
//! let broker = Arc::new(RedisBroker::connect(&config.redis_url).await?);
//!
//! let client = RelayClient::new(broker.clone(), &config.queue_prefix, &config.env, &config.service_name);
//!
//! let worker = WorkerBuilder::new(broker, &config.queue_prefix, &config.env, &config.service_name)
//!     .response_queue_ttl(config.response_queue_ttl)
//!     .build();
//! worker.run().await;
//! # Ok(())
//! # }
//! ```

pub use relay_client::{ClientError, RelayClient};
pub use relay_config::{ConfigError, RelayConfig};
pub use relay_core::{
    Action, ActionBuilder, ActionResponse, CoreError, ErrorDetail, ErrorType, ExecutionContext, TenantTier,
    TenantTierResolver,
};
pub use relay_telemetry::{init_tracing, LogFormat};
pub use relay_transport::{Broker, TransportError};
pub use relay_worker::{ActionHandler, BoxedHandler, ConsumerWorker, ContextHandler, HandlerRegistry, HandlerResult, WorkerBuilder};

#[cfg(feature = "redis")]
pub use relay_transport_redis::RedisBroker;
