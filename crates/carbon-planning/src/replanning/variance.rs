//! Cumulative variance detection

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::allocation::MetricPlan;
use super::config::ReplanningConfig;
use crate::period::YearMonth;

/// Cumulative actual against required for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVariance {
    /// Metric compared
    pub metric_id: Uuid,
    /// Plan version compared
    pub metric_target_id: Uuid,
    /// Elapsed months with an observed actual
    pub months_with_actuals: usize,
    /// Sum of actuals over those months
    pub cumulative_actual: f64,
    /// Sum of required emissions over those months
    pub cumulative_required: f64,
    /// Actual minus required; positive is an overshoot
    pub variance: f64,
    /// Overshoot allowed for this metric
    pub threshold: f64,
    /// Overshoot above `threshold`
    pub exceeded: bool,
}

/// Variance of a whole target as of a cutoff month
///
/// Totals are netted across metrics and only reported. Reallocation is
/// triggered by any single metric above its own threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceReport {
    /// Last elapsed month considered
    pub cutoff: YearMonth,
    /// Per-metric comparison
    pub metrics: Vec<MetricVariance>,
    /// Sum of metric actuals
    pub cumulative_actual: f64,
    /// Sum of metric requirements
    pub cumulative_required: f64,
    /// Netted actual minus required
    pub variance: f64,
    /// Threshold for the netted totals, reported only
    pub threshold: f64,
    /// At least one metric overshoots its threshold
    pub exceeded: bool,
}

impl VarianceReport {
    /// Metrics above their threshold
    pub fn exceeding(&self) -> impl Iterator<Item = &MetricVariance> {
        self.metrics.iter().filter(|m| m.exceeded)
    }
}

/// Compare actuals to required emissions over elapsed months that have data
///
/// Months without an actual are left out on both sides.
pub fn detect_variance(
    plans: &[MetricPlan],
    cutoff: YearMonth,
    config: &ReplanningConfig,
) -> VarianceReport {
    let metrics: Vec<MetricVariance> = plans
        .iter()
        .map(|plan| {
            let observed = plan
                .allocations
                .iter()
                .filter(|a| a.month <= cutoff)
                .filter_map(|a| a.actual_emissions.map(|actual| (actual, a.target_emissions)));
            let mut months_with_actuals = 0;
            let mut cumulative_actual = 0.0;
            let mut cumulative_required = 0.0;
            for (actual, required) in observed {
                months_with_actuals += 1;
                cumulative_actual += actual;
                cumulative_required += required;
            }
            let variance = cumulative_actual - cumulative_required;
            let threshold = config.variance_threshold(cumulative_required);
            MetricVariance {
                metric_id: plan.metric_target.metric_id,
                metric_target_id: plan.metric_target.id,
                months_with_actuals,
                cumulative_actual,
                cumulative_required,
                variance,
                threshold,
                exceeded: variance > threshold,
            }
        })
        .collect();

    let cumulative_actual: f64 = metrics.iter().map(|m| m.cumulative_actual).sum();
    let cumulative_required: f64 = metrics.iter().map(|m| m.cumulative_required).sum();
    let variance = cumulative_actual - cumulative_required;
    let threshold = config.variance_threshold(cumulative_required);
    let exceeded = metrics.iter().any(|m| m.exceeded);

    VarianceReport {
        cutoff,
        metrics,
        cumulative_actual,
        cumulative_required,
        variance,
        threshold,
        exceeded,
    }
}
