//! Metric catalog lookups

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{PlanningError, PlanningResult};
use crate::units::Unit;

/// GHG Protocol emission scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionScope {
    /// Direct emissions
    Scope1,
    /// Purchased energy
    Scope2,
    /// Value chain
    Scope3,
}

impl std::fmt::Display for EmissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmissionScope::Scope1 => write!(f, "Scope 1"),
            EmissionScope::Scope2 => write!(f, "Scope 2"),
            EmissionScope::Scope3 => write!(f, "Scope 3"),
        }
    }
}

/// Metric category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    /// Purchased electricity
    Electricity,
    /// Boilers, furnaces and other fixed fuel combustion
    StationaryCombustion,
    /// Owned vehicle fuel
    MobileCombustion,
    /// Flights, rail and hotel stays
    BusinessTravel,
    /// Water withdrawal and treatment
    Water,
    /// Waste generated
    Waste,
    /// Purchased goods and services
    PurchasedGoods,
    /// Anything not covered above
    Other,
}

/// Catalog entry for a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Catalog id
    pub id: Uuid,
    /// Short stable code, e.g. `scope2_electricity`
    pub code: String,
    /// Display name
    pub name: String,
    /// Reporting category
    pub category: MetricCategory,
    /// GHG protocol scope
    pub scope: EmissionScope,
    /// Unit activity values are reported in
    pub unit: Unit,
}

impl MetricDefinition {
    /// Definition with a fresh id
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: MetricCategory,
        scope: EmissionScope,
        unit: Unit,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            category,
            scope,
            unit,
        }
    }
}

/// Read-only metric catalog
#[async_trait]
pub trait MetricCatalog: Send + Sync {
    /// Look up one metric
    async fn lookup(&self, metric_id: Uuid) -> PlanningResult<MetricDefinition>;

    /// Every metric known to the catalog
    async fn list(&self) -> PlanningResult<Vec<MetricDefinition>>;
}

/// Catalog held in memory
#[derive(Clone, Default)]
pub struct InMemoryMetricCatalog {
    metrics: Arc<DashMap<Uuid, MetricDefinition>>,
}

impl InMemoryMetricCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric, returning its id
    pub fn register(&self, metric: MetricDefinition) -> Uuid {
        let id = metric.id;
        self.metrics.insert(id, metric);
        id
    }
}

#[async_trait]
impl MetricCatalog for InMemoryMetricCatalog {
    async fn lookup(&self, metric_id: Uuid) -> PlanningResult<MetricDefinition> {
        self.metrics
            .get(&metric_id)
            .map(|m| m.clone())
            .ok_or(PlanningError::MetricNotFound { metric_id })
    }

    async fn list(&self) -> PlanningResult<Vec<MetricDefinition>> {
        let mut metrics: Vec<MetricDefinition> =
            self.metrics.iter().map(|entry| entry.value().clone()).collect();
        metrics.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.id.cmp(&b.id)));
        Ok(metrics)
    }
}
