//! Producer-tagged observation metadata

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, PlanningResult};
use crate::forecast::{ForecastMetadata, ForecastMethod};

/// Metadata attached to an observation, tagged by producer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationMetadata {
    /// Plain observation
    #[default]
    None,
    /// Electricity grid-mix annotation
    GridMix(GridMixMetadata),
    /// Persisted forecast value
    Forecast(ForecastMetadata),
}

impl ObservationMetadata {
    /// Validate required fields before the row is written
    pub fn validate(&self) -> PlanningResult<()> {
        match self {
            ObservationMetadata::None => Ok(()),
            ObservationMetadata::GridMix(grid) => grid.validate(),
            ObservationMetadata::Forecast(forecast) => validate_forecast(forecast),
        }
    }
}

/// Grid-mix annotation for purchased electricity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMixMetadata {
    /// Grid or market region code
    pub grid_region: String,
    /// Share of renewable generation, 0-100
    pub renewable_percent: f64,
    /// Location-based emission factor in kgCO2e per kWh
    pub emission_factor_kg_per_kwh: f64,
    /// Factor source (e.g. supplier disclosure, national inventory)
    pub source: Option<String>,
}

impl GridMixMetadata {
    fn validate(&self) -> PlanningResult<()> {
        if self.grid_region.trim().is_empty() {
            return Err(PlanningError::InvalidMetadata {
                reason: "grid mix requires a grid_region".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.renewable_percent) {
            return Err(PlanningError::InvalidMetadata {
                reason: format!(
                    "renewable_percent {} outside 0-100",
                    self.renewable_percent
                ),
            });
        }
        if !self.emission_factor_kg_per_kwh.is_finite() || self.emission_factor_kg_per_kwh < 0.0 {
            return Err(PlanningError::InvalidMetadata {
                reason: format!(
                    "emission factor {} must be finite and non-negative",
                    self.emission_factor_kg_per_kwh
                ),
            });
        }
        Ok(())
    }
}

fn validate_forecast(metadata: &ForecastMetadata) -> PlanningResult<()> {
    let numbers = [
        ("r_squared", metadata.r_squared),
        ("trend_slope", metadata.trend_slope),
        ("seasonal_strength", metadata.seasonal_strength),
        ("historical_mean", metadata.historical_mean),
        ("historical_std", metadata.historical_std),
    ];
    if let Some((field, value)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
        return Err(PlanningError::InvalidMetadata {
            reason: format!("forecast {} is not finite ({})", field, value),
        });
    }
    if metadata.method == ForecastMethod::InsufficientData {
        return Err(PlanningError::InvalidMetadata {
            reason: "insufficient-data forecasts are not persisted".to_string(),
        });
    }
    if metadata.training_months == 0 {
        return Err(PlanningError::InvalidMetadata {
            reason: "forecast metadata requires training_months".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn forecast_metadata(method: ForecastMethod) -> ForecastMetadata {
        ForecastMetadata {
            method,
            r_squared: 0.8,
            trend_slope: -12.0,
            seasonal_strength: 2.5,
            training_months: 36,
            historical_mean: 1000.0,
            historical_std: 50.0,
            missing_months: 0,
            extreme_trend: false,
            variance_adjusted: false,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_grid_mix_bounds() {
        let mut grid = GridMixMetadata {
            grid_region: "PT".to_string(),
            renewable_percent: 61.0,
            emission_factor_kg_per_kwh: 0.19,
            source: None,
        };
        assert!(ObservationMetadata::GridMix(grid.clone()).validate().is_ok());

        grid.renewable_percent = 140.0;
        assert!(ObservationMetadata::GridMix(grid).validate().is_err());
    }

    #[test]
    fn test_forecast_metadata_validation() {
        let ok = forecast_metadata(ForecastMethod::SeasonalDecomposition);
        assert!(ObservationMetadata::Forecast(ok.clone()).validate().is_ok());

        let mut nan = ok.clone();
        nan.r_squared = f64::NAN;
        assert!(ObservationMetadata::Forecast(nan).validate().is_err());

        let insufficient = forecast_metadata(ForecastMethod::InsufficientData);
        assert!(ObservationMetadata::Forecast(insufficient).validate().is_err());
    }

    #[test]
    fn test_tagged_serialization() {
        let metadata = ObservationMetadata::GridMix(GridMixMetadata {
            grid_region: "ES".to_string(),
            renewable_percent: 50.0,
            emission_factor_kg_per_kwh: 0.15,
            source: Some("REE".to_string()),
        });
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["kind"], "grid_mix");

        let none: ObservationMetadata = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(none, ObservationMetadata::None);
    }
}
