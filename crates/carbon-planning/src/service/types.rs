//! Request and report types for the planning service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::{MetricFilter, SeriesQuantity};
use crate::error::PlanningResult;
use crate::observation::UpsertSummary;
use crate::period::YearMonth;
use crate::replanning::{MetricTargetStatus, ReplanOutcome};
use crate::trajectory::MonthlyRequirement;
use crate::units::Unit;

/// Forecast request for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// Organization forecast
    pub organization_id: Uuid,
    /// Metrics included
    pub filter: MetricFilter,
    /// Restrict to one site, `None` sums every site
    pub site_id: Option<Uuid>,
    /// Months to forecast; the configured default when `None`
    pub horizon_months: Option<usize>,
    /// Forecast activity or emissions
    pub quantity: SeriesQuantity,
}

impl ForecastRequest {
    /// Emissions forecast over every metric of an organization
    pub fn emissions(organization_id: Uuid, filter: MetricFilter) -> Self {
        Self {
            organization_id,
            filter,
            site_id: None,
            horizon_months: None,
            quantity: SeriesQuantity::Emissions,
        }
    }

    /// Forecast `months` months
    pub fn with_horizon(mut self, months: usize) -> Self {
        self.horizon_months = Some(months);
        self
    }

    /// Restrict to one site
    pub fn with_site(mut self, site_id: Uuid) -> Self {
        self.site_id = Some(site_id);
        self
    }

    /// Forecast `quantity` instead of emissions
    pub fn with_quantity(mut self, quantity: SeriesQuantity) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Required, planned and observed emissions of one metric in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProgress {
    /// Calendar month
    pub month: YearMonth,
    /// Target in the first plan version
    pub original_target: Option<f64>,
    /// Share before initiatives in the current version
    pub planned_emissions: f64,
    /// Required emissions in the current version
    pub target_emissions: f64,
    /// Observed emissions, once the month has data
    pub actual_emissions: Option<f64>,
    /// Actual minus target, when an actual exists
    pub variance: Option<f64>,
}

/// Current plan of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrajectory {
    /// Metric of the plan
    pub metric_id: Uuid,
    /// Current version
    pub metric_target_id: Uuid,
    /// Version number
    pub version: u32,
    /// Lifecycle state
    pub status: MetricTargetStatus,
    /// Every planned month, ascending
    pub months: Vec<MonthlyProgress>,
}

/// Target-level trajectory with per-metric progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTrajectoryReport {
    /// Owning organization
    pub organization_id: Uuid,
    /// Reported target
    pub target_id: Uuid,
    /// Every emission figure in this report
    pub unit: Unit,
    /// Last complete month when the report was built
    pub cutoff: YearMonth,
    /// Required emissions per month for the whole target
    pub required: Vec<MonthlyRequirement>,
    /// Empty until the target has been decomposed
    pub metrics: Vec<MetricTrajectory>,
    /// Sum of actuals through the cutoff
    pub cumulative_actual: f64,
    /// Sum of required emissions through the cutoff
    pub cumulative_required: f64,
}

impl TargetTrajectoryReport {
    /// Whether actuals so far exceed the required path
    pub fn is_behind(&self) -> bool {
        self.cumulative_actual > self.cumulative_required
    }
}

/// Outcome of a forecast regeneration run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegenerationSummary {
    /// Metrics with a persisted forecast
    pub forecasted_metrics: Vec<Uuid>,
    /// Metrics without enough history for a model
    pub skipped_metrics: Vec<Uuid>,
    /// Rows written by the upsert
    pub upserted: UpsertSummary,
}

/// Replanning result for one target
#[derive(Debug)]
pub struct TargetRun {
    /// Replanned target
    pub target_id: Uuid,
    /// Result of the run
    pub outcome: PlanningResult<ReplanOutcome>,
}

/// Scheduled job result for one organization
#[derive(Debug)]
pub struct OrganizationRun {
    /// Organization the job ran for
    pub organization_id: Uuid,
    /// Err when the job could not start, e.g. the lock was held
    pub targets: PlanningResult<Vec<TargetRun>>,
}

impl OrganizationRun {
    /// Events committed by this job
    pub fn replanned(&self) -> usize {
        match &self.targets {
            Ok(runs) => runs
                .iter()
                .filter(|run| matches!(run.outcome, Ok(ReplanOutcome::Replanned(_))))
                .count(),
            Err(_) => 0,
        }
    }
}
