//! Metrics for the replanning engine

use serde::{Deserialize, Serialize};

/// Replanning counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplanningMetrics {
    /// Runs that acquired the organization lock
    pub runs: u64,
    /// Runs that committed a new plan version
    pub replans: u64,
    /// Initial decompositions
    pub initial_decompositions: u64,
    /// Runs with nothing to change
    pub unchanged: u64,
    /// Targets marked complete
    pub completed: u64,
    /// Runs rejected by the organization lock
    pub conflicts: u64,
    /// Outbox events recorded by a later run than the one that staged them
    pub redelivered_events: u64,
}

impl ReplanningMetrics {
    /// Share of runs that produced a new plan
    pub fn replan_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.replans as f64 / self.runs as f64
        }
    }
}
