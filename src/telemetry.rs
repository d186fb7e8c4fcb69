use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Install the global subscriber. `RUST_LOG` wins over `server.log_level`.
///
/// Production emits one JSON object per line; the enclosing request span is
/// attached, so `request_id`/`user_id`/`tenant_id` ride along on every event.
pub fn init(server: &ServerConfig, json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    } else {
        builder.try_init()
    }
}
