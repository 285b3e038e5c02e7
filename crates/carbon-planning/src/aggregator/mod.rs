//! Monthly aggregation of raw observations
//!
//! Walks the store exhaustively, resolves duplicate keys, normalizes units
//! and emits one aggregate per month with explicit gap months.

#[allow(clippy::module_inception)]
mod aggregator;
mod config;
mod dedup;
mod types;

pub use aggregator::Aggregator;
pub use config::{AggregatorConfig, DedupPolicy};
pub use dedup::{deduplicate, DedupOutcome};
pub use types::{
    AggregationReport, AggregationRequest, MetricFilter, MonthlyAggregate, MonthlySeries,
    SeriesQuantity,
};
