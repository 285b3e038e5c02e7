//! In-memory target source and plan store

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::store::{PlanCommit, PlanStore, TargetSource};
use super::types::{
    MetricTarget, MetricTargetStatus, MonthlyTargetAllocation, ReductionInitiative, ReplanningEvent,
};
use crate::error::{PlanningError, PlanningResult};
use crate::period::YearMonth;
use crate::trajectory::Target;

/// Targets held in memory
#[derive(Clone, Default)]
pub struct InMemoryTargetSource {
    targets: Arc<DashMap<Uuid, Target>>,
}

impl InMemoryTargetSource {
    /// Empty target source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a target, returning its id
    pub fn insert(&self, target: Target) -> Uuid {
        let id = target.id;
        self.targets.insert(id, target);
        id
    }
}

#[async_trait]
impl TargetSource for InMemoryTargetSource {
    async fn get_target(&self, organization_id: Uuid, target_id: Uuid) -> PlanningResult<Target> {
        self.targets
            .get(&target_id)
            .filter(|t| t.organization_id == organization_id)
            .map(|t| t.clone())
            .ok_or(PlanningError::TargetNotFound {
                organization_id,
                target_id,
            })
    }

    async fn list_targets(&self, organization_id: Uuid) -> PlanningResult<Vec<Target>> {
        let mut targets: Vec<Target> = self
            .targets
            .iter()
            .filter(|t| t.organization_id == organization_id)
            .map(|t| t.value().clone())
            .collect();
        targets.sort_by_key(|t| (t.baseline_year, t.id));
        Ok(targets)
    }
}

#[derive(Default)]
struct PlanState {
    metric_targets: HashMap<Uuid, MetricTarget>,
    allocations: HashMap<Uuid, BTreeMap<YearMonth, MonthlyTargetAllocation>>,
    initiatives: HashMap<Uuid, ReductionInitiative>,
    outbox: Vec<ReplanningEvent>,
}

/// Plan store behind a single lock so commits are atomic
#[derive(Clone, Default)]
pub struct InMemoryPlanStore {
    state: Arc<RwLock<PlanState>>,
}

impl InMemoryPlanStore {
    /// Empty plan store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of metric target rows, every version included
    pub fn metric_target_count(&self) -> usize {
        self.state.read().metric_targets.len()
    }

    /// Number of staged events awaiting history delivery
    pub fn pending_event_count(&self) -> usize {
        self.state.read().outbox.len()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn get_metric_target(&self, metric_target_id: Uuid) -> PlanningResult<MetricTarget> {
        self.state
            .read()
            .metric_targets
            .get(&metric_target_id)
            .cloned()
            .ok_or(PlanningError::MetricTargetNotFound { metric_target_id })
    }

    async fn list_metric_targets(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> PlanningResult<Vec<MetricTarget>> {
        let mut rows: Vec<MetricTarget> = self
            .state
            .read()
            .metric_targets
            .values()
            .filter(|mt| mt.organization_id == organization_id && mt.target_id == target_id)
            .cloned()
            .collect();
        rows.sort_by_key(|mt| (mt.metric_id, mt.version));
        Ok(rows)
    }

    async fn allocations(
        &self,
        metric_target_id: Uuid,
    ) -> PlanningResult<Vec<MonthlyTargetAllocation>> {
        let state = self.state.read();
        if !state.metric_targets.contains_key(&metric_target_id) {
            return Err(PlanningError::MetricTargetNotFound { metric_target_id });
        }
        Ok(state
            .allocations
            .get(&metric_target_id)
            .map(|months| months.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_initiatives(
        &self,
        organization_id: Uuid,
    ) -> PlanningResult<Vec<ReductionInitiative>> {
        let mut rows: Vec<ReductionInitiative> = self
            .state
            .read()
            .initiatives
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| (i.implementation_year, i.id));
        Ok(rows)
    }

    async fn get_initiative(&self, initiative_id: Uuid) -> PlanningResult<ReductionInitiative> {
        self.state
            .read()
            .initiatives
            .get(&initiative_id)
            .cloned()
            .ok_or(PlanningError::InitiativeNotFound { initiative_id })
    }

    async fn upsert_initiative(&self, initiative: ReductionInitiative) -> PlanningResult<()> {
        self.state.write().initiatives.insert(initiative.id, initiative);
        Ok(())
    }

    async fn commit_plan(&self, commit: PlanCommit) -> PlanningResult<()> {
        let mut state = self.state.write();

        let committed: HashMap<Uuid, &MetricTarget> =
            commit.metric_targets.iter().map(|mt| (mt.id, mt)).collect();

        for allocation in &commit.allocations {
            if !committed.contains_key(&allocation.metric_target_id)
                && !state.metric_targets.contains_key(&allocation.metric_target_id)
            {
                return Err(PlanningError::MetricTargetNotFound {
                    metric_target_id: allocation.metric_target_id,
                });
            }
        }

        // At most one active version per (target, metric) once applied.
        let mut active = HashSet::new();
        let untouched = state
            .metric_targets
            .values()
            .filter(|mt| !committed.contains_key(&mt.id));
        for mt in untouched.chain(commit.metric_targets.iter()) {
            if mt.status == MetricTargetStatus::Active
                && !active.insert((mt.target_id, mt.metric_id))
            {
                return Err(PlanningError::ConcurrentReplan {
                    organization_id: mt.organization_id,
                });
            }
        }

        for mt in commit.metric_targets {
            state.metric_targets.insert(mt.id, mt);
        }
        for allocation in commit.allocations {
            state
                .allocations
                .entry(allocation.metric_target_id)
                .or_default()
                .insert(allocation.month, allocation);
        }
        if let Some(event) = commit.event {
            state.outbox.push(event);
        }
        Ok(())
    }

    async fn pending_events(&self, organization_id: Uuid) -> PlanningResult<Vec<ReplanningEvent>> {
        Ok(self
            .state
            .read()
            .outbox
            .iter()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn acknowledge_event(&self, event_id: Uuid) -> PlanningResult<()> {
        self.state.write().outbox.retain(|e| e.id != event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replanning::allocation::tests::plan_with;
    use crate::replanning::types::ReplanTrigger;
    use chrono::Utc;

    fn event(organization_id: Uuid, target_id: Uuid) -> ReplanningEvent {
        ReplanningEvent {
            id: Uuid::new_v4(),
            organization_id,
            target_id,
            triggered_at: Utc::now(),
            trigger: ReplanTrigger::Scheduled,
            reason: "initial decomposition".to_string(),
            previous_allocations: Vec::new(),
            new_allocations: Vec::new(),
            total_budget: 1200.0,
            remaining_budget: 1200.0,
            remaining_reduction: 0.0,
        }
    }

    #[tokio::test]
    async fn test_event_staged_with_commit_until_acknowledged() {
        let store = InMemoryPlanStore::new();
        let plan = plan_with(2025, &[100.0; 12]);
        let mt = plan.metric_target.clone();
        let staged = event(mt.organization_id, mt.target_id);

        store
            .commit_plan(PlanCommit {
                metric_targets: vec![mt.clone()],
                allocations: plan.allocations,
                event: Some(staged.clone()),
            })
            .await
            .unwrap();

        assert_eq!(store.metric_target_count(), 1);
        assert_eq!(
            store.pending_events(mt.organization_id).await.unwrap(),
            vec![staged.clone()]
        );
        assert!(store.pending_events(Uuid::new_v4()).await.unwrap().is_empty());

        store.acknowledge_event(staged.id).await.unwrap();
        assert_eq!(store.pending_event_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_commit_stages_nothing() {
        let store = InMemoryPlanStore::new();
        let plan = plan_with(2025, &[100.0; 12]);
        let first = plan.metric_target.clone();
        let mut second = first.clone();
        second.id = Uuid::new_v4();

        let result = store
            .commit_plan(PlanCommit {
                metric_targets: vec![first.clone(), second],
                allocations: Vec::new(),
                event: Some(event(first.organization_id, first.target_id)),
            })
            .await;

        assert!(matches!(result, Err(PlanningError::ConcurrentReplan { .. })));
        assert_eq!(store.metric_target_count(), 0);
        assert_eq!(store.pending_event_count(), 0);
    }
}
