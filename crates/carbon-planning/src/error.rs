//! Carbon planning error types

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Carbon planning error types
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Not enough history to fit a forecasting model
    #[error("Insufficient data for {series_id}: {months} months available, {required} required")]
    InsufficientData {
        series_id: String,
        months: usize,
        required: usize,
    },

    /// More than one row for an observation uniqueness key
    #[error("Duplicate observation for metric {metric_id} at {period_start}: {count} rows")]
    DuplicateObservation {
        metric_id: Uuid,
        period_start: NaiveDate,
        count: usize,
    },

    /// Observation unit cannot be converted to the metric's unit
    #[error("Unit mismatch for metric {metric_id}: expected {expected}, found {found}")]
    UnitMismatch {
        metric_id: Uuid,
        expected: String,
        found: String,
    },

    /// Another replanning job holds the organization lock
    #[error("Replanning already in progress for organization {organization_id}")]
    ConcurrentReplan { organization_id: Uuid },

    /// Reallocated budget does not add up to the remaining budget
    #[error("Allocation conservation violated: expected {expected:.3}, allocated {actual:.3} (tolerance {tolerance})")]
    AllocationConservationViolation {
        expected: f64,
        actual: f64,
        tolerance: f64,
    },

    /// Actual emissions already exceed the whole cumulative budget
    #[error("Remaining budget exhausted for target {target_id}: {remaining:.3} kgCO2e left")]
    RemainingBudgetExhausted { target_id: Uuid, remaining: f64 },

    /// Target definition is not usable
    #[error("Invalid target: {reason}")]
    InvalidTarget { reason: String },

    /// Date or month range with start after end
    #[error("Invalid range: {start} is after {end}")]
    InvalidRange { start: String, end: String },

    /// Target not found
    #[error("Target {target_id} not found for organization {organization_id}")]
    TargetNotFound {
        organization_id: Uuid,
        target_id: Uuid,
    },

    /// Metric not present in the catalog
    #[error("Metric {metric_id} not found in catalog")]
    MetricNotFound { metric_id: Uuid },

    /// Metric target not found
    #[error("Metric target {metric_target_id} not found")]
    MetricTargetNotFound { metric_target_id: Uuid },

    /// Reduction initiative not found
    #[error("Reduction initiative {initiative_id} not found")]
    InitiativeNotFound { initiative_id: Uuid },

    /// Metric target status change not allowed by the lifecycle
    #[error("Invalid metric target transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Observation metadata failed validation at the store boundary
    #[error("Invalid observation metadata: {reason}")]
    InvalidMetadata { reason: String },

    /// No baseline-year emissions for any metric covered by a target
    #[error("No baseline data for target {target_id} in {baseline_year}")]
    NoBaselineData { target_id: Uuid, baseline_year: i32 },

    /// Run cache used for a request of another organization
    #[error("Run cache of organization {cache_organization_id} used for organization {organization_id}")]
    CacheScopeMismatch {
        cache_organization_id: Uuid,
        organization_id: Uuid,
    },

    /// Store pagination misbehaved
    #[error("Pagination error: {reason}")]
    Pagination { reason: String },

    /// Storage backend failure
    #[error("Store error: {message}")]
    Store { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    /// I/O error
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
}

impl PlanningError {
    /// Whether the caller may retry the same operation later
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PlanningError::ConcurrentReplan { .. } | PlanningError::Store { .. }
        )
    }

    /// Whether the error signals a broken planning invariant
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            PlanningError::AllocationConservationViolation { .. }
                | PlanningError::ConcurrentReplan { .. }
                | PlanningError::InvalidTransition { .. }
                | PlanningError::CacheScopeMismatch { .. }
        )
    }
}

/// Carbon planning result type
pub type PlanningResult<T> = Result<T, PlanningError>;
