//! Forecast engine: model selection and projection

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::algorithms::ForecastAlgorithms;
use super::config::{z_score, ForecastConfig, VarianceAdjustment, MIN_MODEL_MONTHS, MIN_SEASONAL_MONTHS};
use super::metrics::ForecastMetrics;
use super::types::{ConfidenceBand, ForecastMetadata, ForecastMethod, ForecastResult};
use crate::aggregator::MonthlySeries;
use crate::error::PlanningResult;
use crate::period::YearMonth;

/// Model output before post-processing
struct ModelOutput {
    method: ForecastMethod,
    values: Vec<f64>,
    residuals: Vec<f64>,
    r_squared: f64,
    trend_slope: f64,
    seasonal_strength: f64,
    profile: Option<[f64; 12]>,
}

/// Selects a model by history length and projects future months
pub struct ForecastEngine {
    config: Arc<ForecastConfig>,
    metrics: Arc<RwLock<ForecastMetrics>>,
}

impl ForecastEngine {
    /// Create a new engine after validating `config`
    pub fn new(config: ForecastConfig) -> PlanningResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(ForecastMetrics::default())),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast `horizon` months following the last month of `series`
    ///
    /// Series shorter than 12 months yield an `InsufficientData` result with
    /// zero values rather than an error.
    pub fn forecast(&self, series: &MonthlySeries, horizon: usize) -> ForecastResult {
        let history = &series.values;
        let n = history.len();
        let first_month = series
            .last_month()
            .map(|m| m.next())
            .unwrap_or(series.start);
        let months: Vec<YearMonth> = (0..horizon as i64).map(|i| first_month.add_months(i)).collect();

        let output = if n >= MIN_SEASONAL_MONTHS {
            self.seasonal(history, horizon, series.start)
        } else if n >= MIN_MODEL_MONTHS {
            self.smoothing(history, horizon)
        } else {
            debug!(series_id = %series.series_id, months = n, "Series too short to model");
            ModelOutput {
                method: ForecastMethod::InsufficientData,
                values: vec![0.0; horizon],
                residuals: Vec::new(),
                r_squared: 0.0,
                trend_slope: 0.0,
                seasonal_strength: 0.0,
                profile: None,
            }
        };

        let historical_mean = ForecastAlgorithms::mean(history);
        let historical_std = ForecastAlgorithms::std_dev(history);

        let extreme_trend = output.method != ForecastMethod::InsufficientData
            && output.trend_slope.abs() > self.config.extreme_slope_ratio * historical_mean.abs();
        if extreme_trend {
            warn!(
                series_id = %series.series_id,
                slope = output.trend_slope,
                historical_mean,
                "Extreme trend detected; forecast left unclamped"
            );
        }

        let mut forecasted = output.values;
        let mut variance_adjusted = false;
        if self.config.variance_adjustment == VarianceAdjustment::PreserveHistoricalVariance
            && output.method != ForecastMethod::InsufficientData
        {
            if let Some(adjusted) = ForecastAlgorithms::preserve_variance(&forecasted, historical_std)
            {
                forecasted = adjusted;
                variance_adjusted = true;
            }
        }

        let confidence = self.band(&forecasted, &output.residuals);

        {
            let mut metrics = self.metrics.write();
            metrics.forecasts_generated += 1;
            match output.method {
                ForecastMethod::SeasonalDecomposition => metrics.seasonal_models += 1,
                ForecastMethod::ExponentialSmoothing => metrics.smoothing_models += 1,
                ForecastMethod::InsufficientData => metrics.insufficient_data += 1,
            }
            if extreme_trend {
                metrics.extreme_trends += 1;
            }
        }

        info!(
            series_id = %series.series_id,
            method = %output.method,
            training_months = n,
            horizon,
            r_squared = output.r_squared,
            "Generated forecast"
        );

        ForecastResult {
            series_id: series.series_id.clone(),
            method: output.method,
            forecasted,
            months,
            unit: series.unit,
            confidence,
            seasonal_profile: output.profile,
            metadata: ForecastMetadata {
                method: output.method,
                r_squared: output.r_squared,
                trend_slope: output.trend_slope,
                seasonal_strength: output.seasonal_strength,
                training_months: n,
                historical_mean,
                historical_std,
                missing_months: series.missing_months,
                extreme_trend,
                variance_adjusted,
                generated_at: Utc::now(),
            },
        }
    }

    fn seasonal(&self, history: &[f64], horizon: usize, start: YearMonth) -> ModelOutput {
        let n = history.len();
        let fit = ForecastAlgorithms::seasonal_decomposition(history);
        let seasonal: Vec<f64> = (0..n).map(|i| fit.profile[i % 12]).collect();

        // Profile index 0 is the first history month; re-key it by calendar month.
        let mut calendar = [0.0; 12];
        for (k, value) in fit.profile.iter().enumerate() {
            calendar[(start.month0() + k) % 12] = *value;
        }

        ModelOutput {
            method: ForecastMethod::SeasonalDecomposition,
            values: (0..horizon).map(|h| fit.value_at(n + h).max(0.0)).collect(),
            r_squared: ForecastAlgorithms::r_squared(history, &fit.fitted),
            trend_slope: fit.slope,
            seasonal_strength: ForecastAlgorithms::seasonal_strength(
                &seasonal,
                &fit.remainder,
                self.config.seasonal_strength_ceiling,
            ),
            residuals: fit.remainder,
            profile: Some(calendar),
        }
    }

    fn smoothing(&self, history: &[f64], horizon: usize) -> ModelOutput {
        let fit = ForecastAlgorithms::holt(history, self.config.alpha, self.config.beta);
        let residuals: Vec<f64> = history
            .iter()
            .zip(&fit.fitted)
            .skip(1)
            .map(|(y, f)| y - f)
            .collect();

        ModelOutput {
            method: ForecastMethod::ExponentialSmoothing,
            values: (1..=horizon).map(|h| fit.value_ahead(h).max(0.0)).collect(),
            r_squared: ForecastAlgorithms::r_squared(&history[1..], &fit.fitted[1..]),
            trend_slope: fit.trend,
            seasonal_strength: 0.0,
            residuals,
            profile: None,
        }
    }

    /// Band of `z * sigma * sqrt(h)` around each value, lower bound floored at zero
    fn band(&self, values: &[f64], residuals: &[f64]) -> ConfidenceBand {
        let level = self.config.confidence_level;
        let z = z_score(level).unwrap_or(1.96);
        let sigma = ForecastAlgorithms::std_dev(residuals);

        let (lower, upper) = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let width = z * sigma * ((i + 1) as f64).sqrt();
                ((v - width).max(0.0), v + width)
            })
            .unzip();

        ConfidenceBand {
            level,
            lower,
            upper,
        }
    }

    /// Get engine metrics
    pub fn get_metrics(&self) -> ForecastMetrics {
        self.metrics.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn series(values: Vec<f64>) -> MonthlySeries {
        MonthlySeries {
            series_id: "test".to_string(),
            start: YearMonth::new(2022, 1).unwrap(),
            values,
            unit: Unit::Kwh,
            missing_months: 0,
        }
    }

    #[test]
    fn test_forecast_months_follow_history() {
        let engine = ForecastEngine::new(ForecastConfig::default()).unwrap();
        let result = engine.forecast(&series(vec![100.0; 24]), 3);
        assert_eq!(result.method, ForecastMethod::ExponentialSmoothing);
        assert_eq!(result.months[0], YearMonth::new(2024, 1).unwrap());
        assert_eq!(result.months.len(), 3);
        assert_eq!(result.confidence.lower.len(), 3);
        assert!(!result.metadata.extreme_trend);
    }

    #[test]
    fn test_steep_decline_is_flagged_and_floored() {
        let engine = ForecastEngine::new(ForecastConfig::default()).unwrap();
        let values: Vec<f64> = (0..12).map(|i| 1000.0 - 80.0 * i as f64).collect();
        let result = engine.forecast(&series(values), 12);
        assert!(result.metadata.extreme_trend);
        assert!(result.forecasted.iter().all(|v| *v >= 0.0));
        assert_eq!(*result.forecasted.last().unwrap(), 0.0);
        assert_eq!(engine.get_metrics().extreme_trends, 1);
    }

    #[test]
    fn test_variance_adjustment_is_opt_in() {
        let values: Vec<f64> = (0..40)
            .map(|i| 500.0 + if i % 12 == 6 { 200.0 } else { 0.0 } + (i % 3) as f64 * 10.0)
            .collect();
        let plain = ForecastEngine::new(ForecastConfig::default())
            .unwrap()
            .forecast(&series(values.clone()), 12);
        assert!(!plain.metadata.variance_adjusted);

        let adjusted = ForecastEngine::new(ForecastConfig {
            variance_adjustment: VarianceAdjustment::PreserveHistoricalVariance,
            ..Default::default()
        })
        .unwrap()
        .forecast(&series(values), 12);
        assert!(adjusted.metadata.variance_adjusted);
    }
}
