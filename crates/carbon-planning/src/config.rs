//! Planning configuration
//!
//! One document with a section per component. Every section has defaults, so
//! a file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aggregator::AggregatorConfig;
use crate::cache::CacheConfig;
use crate::error::{PlanningError, PlanningResult};
use crate::forecast::ForecastConfig;
use crate::replanning::ReplanningConfig;
use crate::telemetry::TelemetryConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Aggregation and deduplication
    pub aggregator: AggregatorConfig,
    /// Forecast models
    pub forecast: ForecastConfig,
    /// Variance detection and reallocation
    pub replanning: ReplanningConfig,
    /// Run cache
    pub cache: CacheConfig,
    /// Logging
    pub telemetry: TelemetryConfig,
}

impl PlanningConfig {
    /// Check every section
    pub fn validate(&self) -> PlanningResult<()> {
        if self.aggregator.page_size == 0 {
            return Err(PlanningError::ConfigurationError {
                message: "aggregator.page_size must be positive".to_string(),
            });
        }
        self.forecast.validate()?;
        self.replanning.validate()?;
        self.telemetry.validate()
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file and validate
    pub fn load_from_file(path: impl AsRef<Path>) -> PlanningResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let config: PlanningConfig = match extension.as_deref() {
            Some("toml") => toml::from_str(&content).map_err(|e| PlanningError::ConfigurationError {
                message: format!("failed to parse {}: {}", path.display(), e),
            })?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| PlanningError::ConfigurationError {
                    message: format!("failed to parse {}: {}", path.display(), e),
                })?
            }
            _ => {
                return Err(PlanningError::ConfigurationError {
                    message: format!(
                        "unsupported config format for {} (expected .toml, .yaml or .yml)",
                        path.display()
                    ),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }
}
