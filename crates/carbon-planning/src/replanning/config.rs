//! Configuration for the replanning engine

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, PlanningResult};
use crate::trajectory::TrajectoryPolicy;

/// How remaining budget is shared between metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingPolicy {
    /// Remaining months times trailing average monthly actual
    RemainingPotential,
    /// Forecast emissions over the remaining months
    ForecastPotential,
    /// Baseline emissions share
    BaselineShare,
    /// Same weight for every metric
    Equal,
}

/// How annual requirements of a new plan are split into months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// One twelfth per month
    Even,
    /// Seasonal profile of the metric's forecast, even when unavailable
    ForecastSeasonal,
}

/// Replanning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplanningConfig {
    /// Minimum cumulative overshoot that triggers a replan, kgCO2e
    pub absolute_threshold: f64,
    /// Overshoot relative to cumulative requirement that triggers a replan
    pub variance_ratio: f64,
    /// Relative tolerance of the budget conservation check
    pub conservation_tolerance: f64,
    /// Remaining budget weighting
    pub weighting: WeightingPolicy,
    /// Months of actuals averaged for remaining potential
    pub trailing_months: usize,
    /// Phasing of new plans
    pub trajectory_policy: TrajectoryPolicy,
    /// Monthly split of new plans
    pub monthly_split: SplitPolicy,
    /// Months of history loaded for forecast-based weighting and splits
    pub history_months: usize,
}

impl Default for ReplanningConfig {
    fn default() -> Self {
        Self {
            absolute_threshold: 1.0,
            variance_ratio: 0.02,
            conservation_tolerance: 1e-6,
            weighting: WeightingPolicy::RemainingPotential,
            trailing_months: 12,
            trajectory_policy: TrajectoryPolicy::Linear,
            monthly_split: SplitPolicy::Even,
            history_months: 48,
        }
    }
}

impl ReplanningConfig {
    /// Reject out-of-range settings with `ConfigurationError`
    pub fn validate(&self) -> PlanningResult<()> {
        if self.absolute_threshold < 0.0 || !self.absolute_threshold.is_finite() {
            return Err(PlanningError::ConfigurationError {
                message: "replanning.absolute_threshold must be finite and non-negative".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.variance_ratio) {
            return Err(PlanningError::ConfigurationError {
                message: format!(
                    "replanning.variance_ratio must be within [0, 1], got {}",
                    self.variance_ratio
                ),
            });
        }
        if self.conservation_tolerance <= 0.0 {
            return Err(PlanningError::ConfigurationError {
                message: "replanning.conservation_tolerance must be positive".to_string(),
            });
        }
        if self.trailing_months == 0 || self.history_months == 0 {
            return Err(PlanningError::ConfigurationError {
                message: "replanning month windows must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Overshoot above which a cumulative variance triggers reallocation
    pub fn variance_threshold(&self, cumulative_required: f64) -> f64 {
        self.absolute_threshold
            .max(self.variance_ratio * cumulative_required)
    }
}
