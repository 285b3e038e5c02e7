//! Configuration for the forecast engine

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, PlanningResult};

/// History length below which no model is fitted
pub const MIN_MODEL_MONTHS: usize = 12;

/// History length at which seasonal decomposition is used
pub const MIN_SEASONAL_MONTHS: usize = 36;

/// Optional post-processing of forecast values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceAdjustment {
    /// Forecast values are returned as modelled
    None,
    /// Rescale deviations around the forecast mean to the historical spread
    PreserveHistoricalVariance,
}

/// Forecast engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Holt level smoothing factor (0.0 - 1.0)
    pub alpha: f64,
    /// Holt trend smoothing factor (0.0 - 1.0)
    pub beta: f64,
    /// Confidence level of the prediction band
    pub confidence_level: f64,
    /// |slope| / historical mean above which a trend is flagged as extreme
    pub extreme_slope_ratio: f64,
    /// Ceiling applied to seasonal strength when the remainder is flat
    pub seasonal_strength_ceiling: f64,
    /// Post-processing applied to forecast values
    pub variance_adjustment: VarianceAdjustment,
    /// Default horizon in months
    pub default_horizon: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.3,
            confidence_level: 0.95,
            extreme_slope_ratio: 0.1,
            seasonal_strength_ceiling: 1.0e6,
            variance_adjustment: VarianceAdjustment::None,
            default_horizon: 12,
        }
    }
}

impl ForecastConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> PlanningResult<()> {
        let unit_interval = |name: &str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(PlanningError::ConfigurationError {
                    message: format!("forecast.{} must be in (0, 1], got {}", name, value),
                })
            }
        };
        unit_interval("alpha", self.alpha)?;
        unit_interval("beta", self.beta)?;
        if z_score(self.confidence_level).is_none() {
            return Err(PlanningError::ConfigurationError {
                message: format!(
                    "forecast.confidence_level must be one of 0.8, 0.9, 0.95, 0.99, got {}",
                    self.confidence_level
                ),
            });
        }
        if self.extreme_slope_ratio <= 0.0 || self.seasonal_strength_ceiling <= 0.0 {
            return Err(PlanningError::ConfigurationError {
                message: "forecast thresholds must be positive".to_string(),
            });
        }
        if self.default_horizon == 0 {
            return Err(PlanningError::ConfigurationError {
                message: "forecast.default_horizon must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Two-sided normal quantile for a supported confidence level
pub fn z_score(level: f64) -> Option<f64> {
    const LEVELS: [(f64, f64); 4] = [(0.80, 1.2816), (0.90, 1.6449), (0.95, 1.9600), (0.99, 2.5758)];
    LEVELS
        .iter()
        .find(|(l, _)| (l - level).abs() < 1e-9)
        .map(|(_, z)| *z)
}
