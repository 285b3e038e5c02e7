//! External collaborators the planning engines read and write

use std::sync::Arc;

use crate::observation::{
    InMemoryMetricCatalog, InMemoryObservationStore, MetricCatalog, ObservationStore,
};
use crate::replanning::{
    HistoryRecorder, InMemoryHistoryRecorder, InMemoryPlanStore, InMemoryTargetSource, PlanStore,
    TargetSource,
};

/// Store handles shared by the engines
#[derive(Clone)]
pub struct PlanningBackends {
    /// Raw observations
    pub observations: Arc<dyn ObservationStore>,
    /// Metric definitions
    pub catalog: Arc<dyn MetricCatalog>,
    /// Organization targets
    pub targets: Arc<dyn TargetSource>,
    /// Metric targets, allocations and initiatives
    pub plans: Arc<dyn PlanStore>,
    /// Replanning audit trail
    pub history: Arc<dyn HistoryRecorder>,
}

impl PlanningBackends {
    /// Backends over in-memory stores; the stores share state with the
    /// handles passed in
    pub fn in_memory(
        observations: &InMemoryObservationStore,
        catalog: &InMemoryMetricCatalog,
        targets: &InMemoryTargetSource,
        plans: &InMemoryPlanStore,
        history: &InMemoryHistoryRecorder,
    ) -> Self {
        Self {
            observations: Arc::new(observations.clone()),
            catalog: Arc::new(catalog.clone()),
            targets: Arc::new(targets.clone()),
            plans: Arc::new(plans.clone()),
            history: Arc::new(history.clone()),
        }
    }
}
