//! Environment-driven configuration for relay services.
//!
//! Resolution order, lowest to highest precedence: built-in defaults, then
//! a `.env` file (if present), then whatever is already set in the process
//! environment. A value set directly in the process environment always wins
//! over one loaded from `.env`, which matches `dotenvy`'s own behaviour of
//! never overwriting a variable that's already set.

use std::path::Path;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required environment variable {key}"),
            ConfigError::Invalid { key, message } => write!(f, "invalid value for {key}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolved configuration for a single relay-connected service instance.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// `redis://...` connection string for the broker backend.
    pub redis_url: String,
    /// This instance's own service name — used as the `{service}` segment
    /// when naming the action queue it listens on.
    pub service_name: String,
    /// `{prefix}` segment shared by every queue name in a deployment.
    pub queue_prefix: String,
    /// `{env}` segment distinguishing e.g. `dev`/`staging`/`prod` deployments
    /// sharing a single Redis instance.
    pub env: String,
    /// How long a pseudo-synchronous producer waits for a response before
    /// giving up and returning a `Timeout` error.
    pub response_timeout: Duration,
    /// TTL set on an ephemeral response queue as a backstop against a
    /// producer crashing before it deletes the queue itself.
    pub response_queue_ttl: Duration,
    /// Grace period the consumer worker allows in-flight handlers to finish
    /// after a shutdown signal before abandoning them.
    pub shutdown_grace_period: Duration,
}

impl RelayConfig {
    /// Loads configuration from the process environment, first merging in
    /// a `.env` file from the current directory if one exists.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Loads configuration after merging in `.env` from `path` specifically.
    /// Exposed for tests that don't want to depend on process cwd.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::from_path(path);
        Self::from_env()
    }

    fn from_env() -> Result<Self, ConfigError> {
        let redis_url = required("RELAY_REDIS_URL")?;
        let service_name = required("RELAY_SERVICE_NAME")?;
        let queue_prefix = optional("RELAY_QUEUE_PREFIX", "relay");
        let env = optional("RELAY_ENV", "dev");
        let response_timeout = Duration::from_millis(optional_parsed("RELAY_RESPONSE_TIMEOUT_MS", 5_000)?);
        let response_queue_ttl = Duration::from_secs(optional_parsed("RELAY_RESPONSE_QUEUE_TTL_SECS", 300)?);
        let shutdown_grace_period = Duration::from_secs(optional_parsed("RELAY_SHUTDOWN_GRACE_SECS", 10)?);

        Ok(Self {
            redis_url,
            service_name,
            queue_prefix,
            env,
            response_timeout,
            response_queue_ttl,
            shutdown_grace_period,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_parsed(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid { key, message: e.to_string() }),
    }
}
