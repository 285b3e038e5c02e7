//! Metrics for the planning service

use serde::{Deserialize, Serialize};

/// Service-level counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningMetrics {
    /// Forecasts returned to callers
    pub forecasts_served: u64,
    /// Forecast observations written by regeneration
    pub forecasts_persisted: u64,
    /// Metrics skipped by regeneration for lack of history
    pub forecasts_skipped: u64,
    /// Trajectory reports built
    pub trajectories_served: u64,
    /// Organization jobs started by the scheduler
    pub scheduled_runs: u64,
    /// Organization jobs that failed before replanning any target
    pub failed_runs: u64,
    /// Duplicate rows deleted
    pub duplicates_purged: u64,
}
