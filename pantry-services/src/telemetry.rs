//! Tracing subscriber initialisation.

use pantry_core::{ConfigError, PantryConfig, PantryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse an `EnvFilter` directive, rejecting anything malformed.
pub fn filter_from(directive: &str) -> PantryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|e| {
        ConfigError::Telemetry {
            reason: format!("invalid log filter {:?}: {}", directive, e),
        }
        .into()
    })
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.log_filter` when it parses. Call once at
/// startup; a second call returns an error.
pub fn init_tracing(config: &PantryConfig) -> PantryResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from(&config.log_filter)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.log_json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    result.map_err(|e| {
        ConfigError::Telemetry {
            reason: e.to_string(),
        }
        .into()
    })
}
