//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{ContextError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ContextError::Configuration(format!("invalid log level: {e}")))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| ContextError::Configuration(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default();
        // Another test may have installed a subscriber first; either way the
        // second call in this test must not panic.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
