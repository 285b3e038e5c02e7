//! Target replanning
//!
//! This module provides:
//! - Initial decomposition of a target into versioned per-metric targets
//! - Cumulative variance detection against the required trajectory
//! - Budget-conserving reallocation of the remaining reduction burden
//! - Reduction initiative tracking
//! - An append-only history of every reallocation decision

mod allocation;
mod config;
mod engine;
mod history;
mod locks;
mod memory;
mod metrics;
mod store;
mod types;
mod variance;

pub use allocation::{
    apply_initiatives, initiative_reductions, initiatives_changed, reallocate, BudgetSummary,
    InitiativeAssignment, MetricPlan,
};
pub use config::{ReplanningConfig, SplitPolicy, WeightingPolicy};
pub use engine::ReplanningEngine;
pub use history::{HistoryRecorder, InMemoryHistoryRecorder};
pub use locks::{OrganizationGuard, OrganizationLocks};
pub use memory::{InMemoryPlanStore, InMemoryTargetSource};
pub use metrics::ReplanningMetrics;
pub use store::{PlanCommit, PlanStore, TargetSource};
pub use types::{
    AllocationSnapshot, InitiativeStatus, MetricTarget, MetricTargetStatus,
    MonthlyTargetAllocation, ReductionInitiative, ReplanOutcome, ReplanTrigger, ReplanningEvent,
};
pub use variance::{detect_variance, MetricVariance, VarianceReport};
