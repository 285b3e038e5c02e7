//! Carbon forecasting and target replanning for sustainability metrics
//!
//! This crate provides:
//! - Monthly aggregation of raw observations with duplicate resolution and
//!   unit normalization
//! - Forecasting with seasonal decomposition or Holt smoothing
//! - Linear and pathway trajectories from a baseline to a reduction target
//! - Versioned per-metric plans that are reallocated when emissions drift
//!   from the required trajectory, with an append-only decision history

#![warn(missing_docs)]

pub mod aggregator;
pub mod backends;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod forecast;
pub mod observation;
pub mod period;
pub mod replanning;
pub mod service;
pub mod telemetry;
pub mod trajectory;
pub mod units;

pub use error::{PlanningError, PlanningResult};

// Observations
pub use observation::{
    DataQuality, EmissionScope, GridMixMetadata, InMemoryMetricCatalog, InMemoryObservationStore,
    MetricCatalog, MetricCategory, MetricDefinition, Observation, ObservationMetadata,
    ObservationQuery, ObservationStore,
};

// Aggregation
pub use aggregator::{
    AggregationReport, AggregationRequest, Aggregator, AggregatorConfig, DedupPolicy,
    MetricFilter, MonthlyAggregate, MonthlySeries, SeriesQuantity,
};

// Forecasting
pub use forecast::{
    ConfidenceBand, ForecastConfig, ForecastEngine, ForecastMetadata, ForecastMethod,
    ForecastResult,
};

// Trajectories
pub use trajectory::{
    MonthlySplit, Target, Trajectory, TrajectoryCalculator, TrajectoryPolicy,
};

// Replanning
pub use replanning::{
    HistoryRecorder, InMemoryHistoryRecorder, InMemoryPlanStore, InMemoryTargetSource,
    InitiativeStatus, MetricTarget, MetricTargetStatus, MonthlyTargetAllocation, PlanStore,
    ReductionInitiative, ReplanOutcome, ReplanTrigger, ReplanningConfig, ReplanningEngine,
    ReplanningEvent, TargetSource, WeightingPolicy,
};

// Service
pub use backends::PlanningBackends;
pub use cache::{CacheConfig, RunCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PlanningConfig;
pub use period::YearMonth;
pub use service::{ForecastRequest, PlanningService, TargetTrajectoryReport};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use units::{Dimension, Unit};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[test]
    fn test_planning_framework_creation() {
        let observations = InMemoryObservationStore::new();
        let catalog = InMemoryMetricCatalog::new();
        let targets = InMemoryTargetSource::new();
        let plans = InMemoryPlanStore::new();
        let history = InMemoryHistoryRecorder::new();
        let backends =
            PlanningBackends::in_memory(&observations, &catalog, &targets, &plans, &history);
        let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()));

        let service = PlanningService::new(backends, clock, PlanningConfig::default());
        assert!(service.is_ok());

        let forecast = ForecastEngine::new(ForecastConfig::default());
        assert!(forecast.is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PlanningConfig::default();
        config.replanning.trailing_months = 0;

        let observations = InMemoryObservationStore::new();
        let catalog = InMemoryMetricCatalog::new();
        let targets = InMemoryTargetSource::new();
        let plans = InMemoryPlanStore::new();
        let history = InMemoryHistoryRecorder::new();
        let backends =
            PlanningBackends::in_memory(&observations, &catalog, &targets, &plans, &history);
        let clock = Arc::new(SystemClock);

        assert!(matches!(
            PlanningService::new(backends, clock, config),
            Err(PlanningError::ConfigurationError { .. })
        ));
    }
}
