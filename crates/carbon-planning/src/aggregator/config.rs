//! Configuration for the aggregator

use serde::{Deserialize, Serialize};

/// Which duplicate row survives when several share a uniqueness key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Highest data quality, then most recently verified
    QualityThenRecency,
    /// Most recently verified, then highest data quality
    RecencyThenQuality,
}

/// Aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Rows requested per store page
    pub page_size: usize,
    /// Duplicate retention policy
    pub dedup_policy: DedupPolicy,
    /// Leave persisted forecasts out of actual totals
    pub exclude_forecasts: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            dedup_policy: DedupPolicy::QualityThenRecency,
            exclude_forecasts: true,
        }
    }
}
