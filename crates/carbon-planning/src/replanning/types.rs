//! Replanning entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{PlanningError, PlanningResult};
use crate::period::YearMonth;
use crate::units::Unit;

/// Lifecycle of a metric target version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTargetStatus {
    /// Current plan version
    Active,
    /// Being replaced within a commit
    Reallocating,
    /// Replaced by a newer version
    Superseded,
    /// Target year elapsed
    Complete,
}

impl MetricTargetStatus {
    /// Whether the lifecycle allows moving to `next`
    pub fn can_transition_to(&self, next: MetricTargetStatus) -> bool {
        use MetricTargetStatus::*;
        matches!(
            (self, next),
            (Active, Reallocating) | (Reallocating, Superseded) | (Reallocating, Active) | (Active, Complete)
        )
    }
}

impl std::fmt::Display for MetricTargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricTargetStatus::Active => write!(f, "active"),
            MetricTargetStatus::Reallocating => write!(f, "reallocating"),
            MetricTargetStatus::Superseded => write!(f, "superseded"),
            MetricTargetStatus::Complete => write!(f, "complete"),
        }
    }
}

/// Share of a target assigned to one metric, versioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTarget {
    /// Version id
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Target this share belongs to
    pub target_id: Uuid,
    /// Metric the share is assigned to
    pub metric_id: Uuid,
    /// 1 for the initial decomposition, incremented on every replan
    pub version: u32,
    /// Version this one replaced
    pub supersedes: Option<Uuid>,
    /// Baseline-year activity
    pub baseline_value: f64,
    /// Unit of the activity values
    pub value_unit: Unit,
    /// Baseline-year emissions in kgCO2e
    pub baseline_emissions: f64,
    /// Target-year activity
    pub target_value: f64,
    /// Target-year emissions in kgCO2e
    pub target_emissions: f64,
    /// Lifecycle state
    pub status: MetricTargetStatus,
    /// When this version was created
    pub created_at: DateTime<Utc>,
}

impl MetricTarget {
    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: MetricTargetStatus) -> PlanningResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PlanningError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// New active version replacing `self`
    pub fn successor(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: self.version + 1,
            supersedes: Some(self.id),
            status: MetricTargetStatus::Active,
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Planned and actual emissions of one metric target in one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTargetAllocation {
    /// Allocation id
    pub id: Uuid,
    /// Owning metric target version
    pub metric_target_id: Uuid,
    /// Calendar month
    pub month: YearMonth,
    /// Share of the budget before initiatives
    pub planned_emissions: f64,
    /// Reduction credited to initiatives
    pub initiative_reduction: f64,
    /// Required emissions after initiatives
    pub target_emissions: f64,
    /// Observed emissions, once the month has data
    pub actual_emissions: Option<f64>,
    /// Actual minus target, when an actual exists
    pub variance: Option<f64>,
    /// Unit of every emission figure here
    pub unit: Unit,
}

impl MonthlyTargetAllocation {
    /// Allocation with no initiative reduction or actual yet
    pub fn new(metric_target_id: Uuid, month: YearMonth, planned_emissions: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            metric_target_id,
            month,
            planned_emissions,
            initiative_reduction: 0.0,
            target_emissions: planned_emissions,
            actual_emissions: None,
            variance: None,
            unit: Unit::KgCo2e,
        }
    }

    /// Set the initiative reduction, capping the target at zero
    pub fn set_initiative_reduction(&mut self, reduction: f64) {
        self.initiative_reduction = reduction;
        self.target_emissions = (self.planned_emissions - reduction).max(0.0);
        self.refresh_variance();
    }

    /// Set the observed actual, `None` for a month without data
    pub fn set_actual(&mut self, actual: Option<f64>) {
        self.actual_emissions = actual;
        self.refresh_variance();
    }

    /// Fix the month at its actual value
    pub fn absorb_actual(&mut self, actual: f64) {
        self.planned_emissions = actual;
        self.initiative_reduction = 0.0;
        self.target_emissions = actual;
        self.actual_emissions = Some(actual);
        self.variance = Some(0.0);
    }

    fn refresh_variance(&mut self) {
        self.variance = self.actual_emissions.map(|a| a - self.target_emissions);
    }
}

/// Lifecycle of a reduction initiative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiativeStatus {
    /// Not started, no reduction applied
    Planned,
    /// Being implemented
    Active,
    /// Finished
    Complete,
}

impl InitiativeStatus {
    /// Whether the initiative reduces required emissions
    pub fn applies(&self) -> bool {
        matches!(self, InitiativeStatus::Active | InitiativeStatus::Complete)
    }
}

impl std::fmt::Display for InitiativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitiativeStatus::Planned => write!(f, "planned"),
            InitiativeStatus::Active => write!(f, "active"),
            InitiativeStatus::Complete => write!(f, "complete"),
        }
    }
}

/// Planned emission reduction project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionInitiative {
    /// Initiative id
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Metric target (any version), `None` for a cross-cutting initiative
    pub metric_target_id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// First year the reduction applies
    pub implementation_year: i32,
    /// kgCO2e per year
    pub estimated_annual_reduction: f64,
    /// Lifecycle state
    pub status: InitiativeStatus,
}

impl ReductionInitiative {
    /// Planned initiative with a fresh id
    pub fn new(
        organization_id: Uuid,
        metric_target_id: Option<Uuid>,
        name: impl Into<String>,
        implementation_year: i32,
        estimated_annual_reduction: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            metric_target_id,
            name: name.into(),
            implementation_year,
            estimated_annual_reduction,
            status: InitiativeStatus::Planned,
        }
    }

    /// Monthly reduction applied in `month`, zero when not yet in effect
    pub fn monthly_reduction(&self, month: YearMonth) -> f64 {
        if self.status.applies() && month.year() >= self.implementation_year {
            self.estimated_annual_reduction / 12.0
        } else {
            0.0
        }
    }
}

/// What started a replanning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplanTrigger {
    /// Periodic batch job
    Scheduled,
    /// Requested by a user
    Manual,
    /// An initiative moved to another status
    InitiativeStatusChanged { initiative_id: Uuid },
}

impl std::fmt::Display for ReplanTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplanTrigger::Scheduled => write!(f, "scheduled"),
            ReplanTrigger::Manual => write!(f, "manual"),
            ReplanTrigger::InitiativeStatusChanged { initiative_id } => {
                write!(f, "initiative {} status changed", initiative_id)
            }
        }
    }
}

/// Allocation state of one metric target at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    /// Captured version
    pub metric_target_id: Uuid,
    /// Metric of that version
    pub metric_id: Uuid,
    /// Version number
    pub version: u32,
    /// Sum of planned emissions
    pub total_planned: f64,
    /// Sum of required emissions
    pub total_target: f64,
    /// Required emissions per month
    pub monthly_targets: BTreeMap<YearMonth, f64>,
}

impl AllocationSnapshot {
    /// Snapshot of a plan version and its allocations
    pub fn capture(metric_target: &MetricTarget, allocations: &[MonthlyTargetAllocation]) -> Self {
        Self {
            metric_target_id: metric_target.id,
            metric_id: metric_target.metric_id,
            version: metric_target.version,
            total_planned: allocations.iter().map(|a| a.planned_emissions).sum(),
            total_target: allocations.iter().map(|a| a.target_emissions).sum(),
            monthly_targets: allocations
                .iter()
                .map(|a| (a.month, a.target_emissions))
                .collect(),
        }
    }
}

/// Audit record of one reallocation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplanningEvent {
    /// Event id
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Replanned target
    pub target_id: Uuid,
    /// When the run started
    pub triggered_at: DateTime<Utc>,
    /// What started the run
    pub trigger: ReplanTrigger,
    /// Caller reason followed by the detected causes
    pub reason: String,
    /// Versions replaced, empty for an initial decomposition
    pub previous_allocations: Vec<AllocationSnapshot>,
    /// Versions committed
    pub new_allocations: Vec<AllocationSnapshot>,
    /// Conserved cumulative budget, kgCO2e
    pub total_budget: f64,
    /// Budget left for months after the cutoff, kgCO2e
    pub remaining_budget: f64,
    /// Remaining potential minus remaining budget, kgCO2e
    pub remaining_reduction: f64,
}

/// Result of a replanning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplanOutcome {
    /// A new plan version was committed
    Replanned(ReplanningEvent),
    /// Nothing to change
    Unchanged,
    /// The target year has fully elapsed
    Completed,
}

impl ReplanOutcome {
    /// Event of a committed replan
    pub fn event(&self) -> Option<&ReplanningEvent> {
        match self {
            ReplanOutcome::Replanned(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_target() -> MetricTarget {
        MetricTarget {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            metric_id: Uuid::new_v4(),
            version: 1,
            supersedes: None,
            baseline_value: 1000.0,
            value_unit: Unit::Kwh,
            baseline_emissions: 200.0,
            target_value: 500.0,
            target_emissions: 100.0,
            status: MetricTargetStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut mt = metric_target();
        assert!(mt.transition(MetricTargetStatus::Superseded).is_err());
        mt.transition(MetricTargetStatus::Reallocating).unwrap();
        mt.transition(MetricTargetStatus::Superseded).unwrap();
        assert!(matches!(
            mt.transition(MetricTargetStatus::Active),
            Err(PlanningError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_successor_links_versions() {
        let mt = metric_target();
        let next = mt.successor();
        assert_eq!(next.version, 2);
        assert_eq!(next.supersedes, Some(mt.id));
        assert_eq!(next.metric_id, mt.metric_id);
        assert_ne!(next.id, mt.id);
    }

    #[test]
    fn test_initiative_reduction_capped_at_zero() {
        let mut allocation =
            MonthlyTargetAllocation::new(Uuid::new_v4(), YearMonth::new(2026, 1).unwrap(), 10.0);
        allocation.set_initiative_reduction(25.0);
        assert_eq!(allocation.target_emissions, 0.0);
        allocation.set_actual(Some(4.0));
        assert_eq!(allocation.variance, Some(4.0));
    }

    #[test]
    fn test_planned_initiative_does_not_apply() {
        let mut initiative = ReductionInitiative::new(Uuid::new_v4(), None, "LED retrofit", 2026, 1200.0);
        let month = YearMonth::new(2026, 3).unwrap();
        assert_eq!(initiative.monthly_reduction(month), 0.0);
        initiative.status = InitiativeStatus::Active;
        assert_eq!(initiative.monthly_reduction(month), 100.0);
        assert_eq!(initiative.monthly_reduction(YearMonth::new(2025, 12).unwrap()), 0.0);
    }
}
