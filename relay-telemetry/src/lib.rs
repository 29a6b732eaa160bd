//! Structured logging setup. No metrics or distributed-tracing backend
//! lives here — wiring those up is left to the embedding service, this
//! crate only standardises how `tracing` output is formatted and filtered.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// One JSON object per line, for shipping to a log aggregator.
    Json,
}

/// Installs a global `tracing` subscriber. Call once, at process start.
///
/// The filter defaults to `info` and honours `RUST_LOG` when set, matching
/// every other `tracing`-based service in this workspace.
pub fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => {
            registry.with(fmt::layer().pretty()).init();
        }
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_current_span(true).with_span_list(true)).init();
        }
    }
}
