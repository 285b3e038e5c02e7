//! Append-only replanning history

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::types::ReplanningEvent;
use crate::error::PlanningResult;

/// Audit trail of reallocation decisions; records are never updated or deleted
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Record `event`; existing records are never touched
    async fn append(&self, event: ReplanningEvent) -> PlanningResult<()>;

    /// Events of an organization in append order
    async fn events(&self, organization_id: Uuid) -> PlanningResult<Vec<ReplanningEvent>>;

    /// Events of one target in append order
    async fn events_for_target(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> PlanningResult<Vec<ReplanningEvent>>;
}

/// History held in memory
#[derive(Clone, Default)]
pub struct InMemoryHistoryRecorder {
    events: Arc<RwLock<Vec<ReplanningEvent>>>,
}

impl InMemoryHistoryRecorder {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether no event has been recorded
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl HistoryRecorder for InMemoryHistoryRecorder {
    async fn append(&self, event: ReplanningEvent) -> PlanningResult<()> {
        debug!(event_id = %event.id, target_id = %event.target_id, "Recording replanning event");
        self.events.write().push(event);
        Ok(())
    }

    async fn events(&self, organization_id: Uuid) -> PlanningResult<Vec<ReplanningEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn events_for_target(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> PlanningResult<Vec<ReplanningEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.organization_id == organization_id && e.target_id == target_id)
            .cloned()
            .collect())
    }
}
