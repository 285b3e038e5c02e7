//! Planning service facade
//!
//! Wires the aggregator, forecast engine and replanning engine over one set
//! of backends and exposes the operations callers run per organization.

mod metrics;
mod planning_service;
mod types;

pub use metrics::PlanningMetrics;
pub use planning_service::PlanningService;
pub use types::{
    ForecastRequest, MetricTrajectory, MonthlyProgress, OrganizationRun, RegenerationSummary,
    TargetRun, TargetTrajectoryReport,
};
