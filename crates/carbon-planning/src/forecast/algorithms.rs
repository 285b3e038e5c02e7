//! Mathematical algorithms behind the forecast models
//!
//! Ordinary least squares trend, additive seasonal decomposition with a
//! 12-month profile, Holt's linear exponential smoothing and the fit quality
//! measures reported with every forecast.

use statistical::{mean, population_variance, standard_deviation};

const EPSILON: f64 = 1e-12;

/// Fitted OLS trend plus seasonal profile
#[derive(Debug, Clone)]
pub struct SeasonalFit {
    /// Trend value at index 0
    pub intercept: f64,
    /// Trend change per month
    pub slope: f64,
    /// Seasonal component by `index mod 12`, relative to the first value
    pub profile: [f64; 12],
    /// Trend plus seasonal component at each history index
    pub fitted: Vec<f64>,
    /// History minus fitted values
    pub remainder: Vec<f64>,
}

impl SeasonalFit {
    /// Modelled value at index `t` (history or future)
    pub fn value_at(&self, t: usize) -> f64 {
        self.intercept + self.slope * t as f64 + self.profile[t % 12]
    }
}

/// Final Holt state and one-step-ahead fits
#[derive(Debug, Clone)]
pub struct HoltFit {
    /// Smoothed level after the last value
    pub level: f64,
    /// Smoothed trend after the last value
    pub trend: f64,
    /// One-step-ahead prediction for each history index; index 0 is the seed
    pub fitted: Vec<f64>,
}

impl HoltFit {
    /// Forecast `h` steps past the last observation (`h >= 1`)
    pub fn value_ahead(&self, h: usize) -> f64 {
        self.level + self.trend * h as f64
    }
}

/// Forecasting algorithms
pub struct ForecastAlgorithms;

impl ForecastAlgorithms {
    /// Mean, zero for an empty slice
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            0.0
        } else {
            mean(values)
        }
    }

    /// Sample standard deviation, zero below two values
    pub fn std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            0.0
        } else {
            standard_deviation(values, None)
        }
    }

    /// Population variance, zero for an empty slice
    pub fn variance(values: &[f64]) -> f64 {
        if values.is_empty() {
            0.0
        } else {
            population_variance(values, None)
        }
    }

    /// Fit `y = intercept + slope * t` over `t = 0..n-1`
    pub fn fit_linear_trend(values: &[f64]) -> (f64, f64) {
        let n = values.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let x_mean = (n as f64 - 1.0) / 2.0;
        let y_mean = Self::mean(values);

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            num += dx * (y - y_mean);
            den += dx * dx;
        }

        let slope = if den > EPSILON { num / den } else { 0.0 };
        (y_mean - slope * x_mean, slope)
    }

    /// Additive decomposition: OLS trend, then detrended values averaged by
    /// position in the 12-month cycle
    pub fn seasonal_decomposition(values: &[f64]) -> SeasonalFit {
        let (intercept, slope) = Self::fit_linear_trend(values);

        let mut sums = [0.0; 12];
        let mut counts = [0usize; 12];
        for (i, y) in values.iter().enumerate() {
            sums[i % 12] += y - (intercept + slope * i as f64);
            counts[i % 12] += 1;
        }
        let mut profile = [0.0; 12];
        for k in 0..12 {
            if counts[k] > 0 {
                profile[k] = sums[k] / counts[k] as f64;
            }
        }

        let mut fit = SeasonalFit {
            intercept,
            slope,
            profile,
            fitted: Vec::with_capacity(values.len()),
            remainder: Vec::with_capacity(values.len()),
        };
        for (i, y) in values.iter().enumerate() {
            let fitted = fit.value_at(i);
            fit.fitted.push(fitted);
            fit.remainder.push(y - fitted);
        }
        fit
    }

    /// Holt's linear method seeded with `level = y0`, `trend = y1 - y0`
    pub fn holt(values: &[f64], alpha: f64, beta: f64) -> HoltFit {
        match values.len() {
            0 => {
                return HoltFit {
                    level: 0.0,
                    trend: 0.0,
                    fitted: Vec::new(),
                }
            }
            1 => {
                return HoltFit {
                    level: values[0],
                    trend: 0.0,
                    fitted: vec![values[0]],
                }
            }
            _ => {}
        }

        let mut level = values[0];
        let mut trend = values[1] - values[0];
        let mut fitted = Vec::with_capacity(values.len());
        fitted.push(values[0]);

        for y in values.iter().skip(1) {
            fitted.push(level + trend);
            let previous_level = level;
            level = alpha * y + (1.0 - alpha) * (level + trend);
            trend = beta * (level - previous_level) + (1.0 - beta) * trend;
        }

        HoltFit {
            level,
            trend,
            fitted,
        }
    }

    /// Coefficient of determination of `fitted` against `actual`
    pub fn r_squared(actual: &[f64], fitted: &[f64]) -> f64 {
        let n = actual.len().min(fitted.len());
        if n == 0 {
            return 0.0;
        }
        let y_mean = Self::mean(&actual[..n]);
        let ss_tot: f64 = actual[..n].iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = actual[..n]
            .iter()
            .zip(&fitted[..n])
            .map(|(y, f)| (y - f).powi(2))
            .sum();

        if ss_tot <= EPSILON {
            return if ss_res <= EPSILON { 1.0 } else { 0.0 };
        }
        1.0 - ss_res / ss_tot
    }

    /// Seasonal variance over remainder variance, bounded by `ceiling`
    pub fn seasonal_strength(seasonal: &[f64], remainder: &[f64], ceiling: f64) -> f64 {
        let seasonal_var = Self::variance(seasonal);
        let remainder_var = Self::variance(remainder);
        if remainder_var <= EPSILON {
            return if seasonal_var <= EPSILON { 0.0 } else { ceiling };
        }
        (seasonal_var / remainder_var).min(ceiling)
    }

    /// Rescale deviations from the forecast mean to match `target_std`
    ///
    /// Returns `None` when the forecast is flat and there is nothing to scale.
    pub fn preserve_variance(forecast: &[f64], target_std: f64) -> Option<Vec<f64>> {
        let forecast_std = Self::std_dev(forecast);
        if forecast_std <= EPSILON || target_std <= EPSILON {
            return None;
        }
        let center = Self::mean(forecast);
        let scale = target_std / forecast_std;
        Some(
            forecast
                .iter()
                .map(|v| (center + (v - center) * scale).max(0.0))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_trend_exact_line() {
        let values: Vec<f64> = (0..10).map(|i| 5.0 + 2.0 * i as f64).collect();
        let (intercept, slope) = ForecastAlgorithms::fit_linear_trend(&values);
        assert_relative_eq!(intercept, 5.0, epsilon = 1e-9);
        assert_relative_eq!(slope, 2.0, epsilon = 1e-9);
        assert_relative_eq!(
            ForecastAlgorithms::r_squared(&values, &values),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_holt_tracks_linear_series() {
        let values: Vec<f64> = (0..24).map(|i| 100.0 + 3.0 * i as f64).collect();
        let fit = ForecastAlgorithms::holt(&values, 0.5, 0.3);
        assert_relative_eq!(fit.trend, 3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.value_ahead(1), 172.0, epsilon = 1e-9);
        assert_eq!(fit.fitted.len(), values.len());
    }

    #[test]
    fn test_profile_recovers_pure_seasonality() {
        let pattern = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, -5.0, -4.0, -3.0, -2.0, -1.0, 0.0];
        let values: Vec<f64> = (0..48).map(|i| 50.0 + pattern[i % 12]).collect();
        let fit = ForecastAlgorithms::seasonal_decomposition(&values);
        assert_relative_eq!(fit.slope, 0.0, epsilon = 0.05);
        assert!(fit.profile[5] > fit.profile[6]);
        assert!(ForecastAlgorithms::r_squared(&values, &fit.fitted) > 0.95);
    }

    #[test]
    fn test_seasonal_strength_is_finite_on_flat_remainder() {
        let strength = ForecastAlgorithms::seasonal_strength(&[1.0, -1.0], &[0.0, 0.0], 1e6);
        assert_eq!(strength, 1e6);
        assert_eq!(ForecastAlgorithms::seasonal_strength(&[0.0], &[0.0], 1e6), 0.0);
    }

    #[test]
    fn test_preserve_variance_flat_forecast_untouched() {
        assert!(ForecastAlgorithms::preserve_variance(&[3.0, 3.0, 3.0], 2.0).is_none());
        let scaled = ForecastAlgorithms::preserve_variance(&[1.0, 3.0], 2.828_427).unwrap();
        assert_relative_eq!(scaled[1] - scaled[0], 4.0, epsilon = 1e-3);
    }
}
