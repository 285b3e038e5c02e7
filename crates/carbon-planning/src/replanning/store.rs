//! Persistence interfaces for targets and plans

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{MetricTarget, MonthlyTargetAllocation, ReductionInitiative, ReplanningEvent};
use crate::error::PlanningResult;
use crate::trajectory::Target;

/// Read access to organization targets
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// Target of an organization, `TargetNotFound` otherwise
    async fn get_target(&self, organization_id: Uuid, target_id: Uuid) -> PlanningResult<Target>;

    /// Every target of an organization
    async fn list_targets(&self, organization_id: Uuid) -> PlanningResult<Vec<Target>>;
}

/// Every write of one replanning run, applied atomically
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanCommit {
    /// Metric targets inserted or replaced by id
    pub metric_targets: Vec<MetricTarget>,
    /// Allocations inserted or replaced by (metric_target_id, month)
    pub allocations: Vec<MonthlyTargetAllocation>,
    /// Event staged in the outbox with these rows, pending history delivery
    pub event: Option<ReplanningEvent>,
}

impl PlanCommit {
    /// Whether the commit writes nothing
    pub fn is_empty(&self) -> bool {
        self.metric_targets.is_empty() && self.allocations.is_empty() && self.event.is_none()
    }
}

/// Engine-owned persistence of metric targets, allocations and initiatives
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Metric target by id, any version
    async fn get_metric_target(&self, metric_target_id: Uuid) -> PlanningResult<MetricTarget>;

    /// Every version for a target, superseded ones included
    async fn list_metric_targets(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> PlanningResult<Vec<MetricTarget>>;

    /// Allocations of one metric target ordered by month
    async fn allocations(&self, metric_target_id: Uuid)
        -> PlanningResult<Vec<MonthlyTargetAllocation>>;

    /// Every initiative of an organization
    async fn list_initiatives(&self, organization_id: Uuid)
        -> PlanningResult<Vec<ReductionInitiative>>;

    /// Initiative by id
    async fn get_initiative(&self, initiative_id: Uuid) -> PlanningResult<ReductionInitiative>;

    /// Insert or replace an initiative by id
    async fn upsert_initiative(&self, initiative: ReductionInitiative) -> PlanningResult<()>;

    /// Apply every write of `commit` or none of them
    ///
    /// A staged event stays in the outbox until acknowledged.
    async fn commit_plan(&self, commit: PlanCommit) -> PlanningResult<()>;

    /// Outbox events of an organization not yet acknowledged, in commit order
    async fn pending_events(&self, organization_id: Uuid) -> PlanningResult<Vec<ReplanningEvent>>;

    /// Remove a delivered event from the outbox
    async fn acknowledge_event(&self, event_id: Uuid) -> PlanningResult<()>;
}
