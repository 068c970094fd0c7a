//! Tracing subscriber initialisation.

use roster_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "roster_directory=info,roster_entities=info,roster_cache=info,warn";

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Reads `RUST_LOG` and `ROSTER_LOG_FORMAT` (`json` or `text`).
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("ROSTER_LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
        field: "RUST_LOG".to_string(),
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ConfigError::InvalidValue {
        field: "tracing".to_string(),
        reason: format!("Failed to init subscriber: {}", e),
    })?;

    tracing::debug!(filter = %config.filter, json = config.json, "tracing initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
        assert!(!TelemetryConfig::default().json);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = TelemetryConfig {
            filter: "roster_directory=loudest".to_string(),
            json: false,
        };
        assert!(matches!(
            init_tracing(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
