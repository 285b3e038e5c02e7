//! Metrics for the forecast engine

use serde::{Deserialize, Serialize};

/// Forecast engine counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Total forecasts produced
    pub forecasts_generated: u64,
    /// Forecasts from seasonal decomposition
    pub seasonal_models: u64,
    /// Forecasts from Holt smoothing
    pub smoothing_models: u64,
    /// Series too short to model
    pub insufficient_data: u64,
    /// Forecasts flagged with an extreme trend
    pub extreme_trends: u64,
}

impl ForecastMetrics {
    /// Share of forecasts backed by a fitted model
    pub fn modelled_rate(&self) -> f64 {
        if self.forecasts_generated == 0 {
            0.0
        } else {
            (self.seasonal_models + self.smoothing_models) as f64 / self.forecasts_generated as f64
        }
    }
}
