//! Tracing initialization
//!
//! Installs a `tracing-subscriber` registry with an environment filter and a
//! formatted stdout layer. `RUST_LOG` overrides the configured level.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{PlanningError, PlanningResult};

/// Global flag to track if tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to the startup span
    pub service_name: String,
    /// One of "trace", "debug", "info", "warn", "error"
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "carbon-planning".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Check the service name and log level
    pub fn validate(&self) -> PlanningResult<()> {
        if self.service_name.is_empty()
            || !self
                .service_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PlanningError::ConfigurationError {
                message: format!(
                    "telemetry.service_name '{}' must be non-empty alphanumeric, '-' or '_'",
                    self.service_name
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(PlanningError::ConfigurationError {
                message: format!(
                    "invalid log level '{}', must be one of: {}",
                    self.log_level,
                    valid_levels.join(", ")
                ),
            });
        }
        Ok(())
    }
}

/// Install the global subscriber; only the first successful call takes effect
pub fn init_tracing(config: &TelemetryConfig) -> PlanningResult<()> {
    config.validate()?;

    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(PlanningError::ConfigurationError {
            message: "tracing has already been initialized".to_string(),
        });
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .try_init()
        .map_err(|e| {
            TRACING_INITIALIZED.store(false, Ordering::SeqCst);
            PlanningError::ConfigurationError {
                message: format!("failed to initialize tracing: {}", e),
            }
        })?;

    tracing::info!(service = %config.service_name, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_service_name() {
        let config = TelemetryConfig {
            service_name: "carbon planning!".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = TelemetryConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PlanningError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_default_is_valid() {
        assert!(TelemetryConfig::default().validate().is_ok());
    }
}
