//! Forecast result types

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, PlanningResult};
use crate::period::YearMonth;
use crate::units::Unit;

use super::config::MIN_MODEL_MONTHS;

/// Model used to produce a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForecastMethod {
    /// OLS trend plus monthly seasonal profile (36+ months)
    SeasonalDecomposition,
    /// Holt's linear trend method (12 to 35 months)
    ExponentialSmoothing,
    /// Fewer than 12 months; values are zero placeholders
    InsufficientData,
}

impl std::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastMethod::SeasonalDecomposition => write!(f, "seasonal-decomposition"),
            ForecastMethod::ExponentialSmoothing => write!(f, "exponential-smoothing"),
            ForecastMethod::InsufficientData => write!(f, "insufficient-data"),
        }
    }
}

/// Fit quality and provenance, persisted with forecast observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    /// Model used
    pub method: ForecastMethod,
    /// Coefficient of determination of fitted values against history
    pub r_squared: f64,
    /// Trend in units per month
    pub trend_slope: f64,
    /// Seasonal variance over remainder variance
    pub seasonal_strength: f64,
    /// Months of history the model saw
    pub training_months: usize,
    /// Mean of the history
    pub historical_mean: f64,
    /// Standard deviation of the history
    pub historical_std: f64,
    /// Interior gap months carried as zeros
    pub missing_months: usize,
    /// Slope magnitude exceeded the configured share of the mean
    pub extreme_trend: bool,
    /// Values were rescaled to the historical variance
    pub variance_adjusted: bool,
    /// When the forecast was produced
    pub generated_at: DateTime<Utc>,
}

/// Prediction band around the forecast values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    /// Confidence level, e.g. 0.95
    pub level: f64,
    /// Lower bound per month, floored at zero
    pub lower: Vec<f64>,
    /// Upper bound per month
    pub upper: Vec<f64>,
}

/// Projected monthly values with quality metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Series the forecast continues
    pub series_id: String,
    /// Model used
    pub method: ForecastMethod,
    /// Forecast values, one per month in `months`
    pub forecasted: Vec<f64>,
    /// Forecast months, ascending
    pub months: Vec<YearMonth>,
    /// Unit of every value
    pub unit: Unit,
    /// Prediction band
    pub confidence: ConfidenceBand,
    /// Calendar-aligned profile (January first), seasonal model only
    pub seasonal_profile: Option<[f64; 12]>,
    /// Fit quality and provenance
    pub metadata: ForecastMetadata,
}

impl ForecastResult {
    /// Whether the values came from a fitted model
    pub fn is_modelled(&self) -> bool {
        self.method != ForecastMethod::InsufficientData
    }

    /// The result, or `InsufficientData` when no model was fitted
    pub fn ensure_modelled(self) -> PlanningResult<Self> {
        if self.is_modelled() {
            Ok(self)
        } else {
            Err(PlanningError::InsufficientData {
                series_id: self.series_id,
                months: self.metadata.training_months,
                required: MIN_MODEL_MONTHS,
            })
        }
    }

    /// Sum of forecast values
    pub fn total(&self) -> f64 {
        self.forecasted.iter().sum()
    }

    /// Value forecast for `month`, if inside the horizon
    pub fn value_for(&self, month: YearMonth) -> Option<f64> {
        self.months
            .iter()
            .position(|m| *m == month)
            .map(|i| self.forecasted[i])
    }

    /// Calendar month (1-based) with the largest seasonal component
    pub fn peak_month(&self) -> Option<u32> {
        self.seasonal_profile.as_ref().and_then(|profile| {
            profile
                .iter()
                .enumerate()
                .max_by_key(|(_, v)| OrderedFloat(**v))
                .map(|(i, _)| i as u32 + 1)
        })
    }
}
