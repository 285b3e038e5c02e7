//! Forecast engine for monthly sustainability series
//!
//! This module provides:
//! - Model selection by history length (seasonal decomposition, Holt
//!   smoothing, or an explicit insufficient-data result)
//! - Fit quality metrics persisted with forecasts
//! - Confidence bands and calendar-aligned seasonal profiles

mod algorithms;
mod config;
mod engine;
mod metrics;
mod types;

pub use algorithms::{ForecastAlgorithms, HoltFit, SeasonalFit};
pub use config::{z_score, ForecastConfig, VarianceAdjustment, MIN_MODEL_MONTHS, MIN_SEASONAL_MONTHS};
pub use engine::ForecastEngine;
pub use metrics::ForecastMetrics;
pub use types::{ConfidenceBand, ForecastMetadata, ForecastMethod, ForecastResult};
