// Tracing subscriber setup for embedders
//
// The host proxy may already own a subscriber; calling this is optional and
// only valid once per process.

use crate::config::Config;
use crate::core::errors::GuardrailError;

/// Install a global tracing subscriber honoring `RUST_LOG` with the
/// configured level as fallback.
pub fn init_tracing(config: &Config) -> Result<(), GuardrailError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    let result = if config.log_format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| {
        GuardrailError::Configuration(format!("Failed to install tracing subscriber: {}", e))
    })
}
