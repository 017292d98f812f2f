//! Tracing setup for binaries and tests embedding sensorlog.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Print the event target with each line.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "sensorlog=info".to_string(),
            with_target: true,
        }
    }
}

/// Install a global fmt subscriber.
///
/// Returns `Ok(false)` if a global subscriber was already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<bool> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_directive)
            .map_err(|e| Error::Config(format!("invalid log directive: {}", e)))?,
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(config.with_target);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(directive = %config.default_directive, "tracing initialized");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }

    #[test]
    fn test_rejects_bad_directive() {
        // RUST_LOG takes precedence over the default directive
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = TelemetryConfig {
            default_directive: "sensorlog=loud".to_string(),
            with_target: false,
        };
        assert!(matches!(init_tracing(&config), Err(Error::Config(_))));
    }
}
