//! Duplicate observation resolution

use std::cmp::Ordering;
use std::collections::HashMap;

use super::config::DedupPolicy;
use crate::observation::{Observation, ObservationKey};

/// Result of resolving duplicate keys
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// One row per key, in key order
    pub kept: Vec<Observation>,
    /// Rows that lost to a better row with the same key
    pub discarded: Vec<Observation>,
}

impl DedupOutcome {
    /// Number of rows that lost
    pub fn discarded_count(&self) -> usize {
        self.discarded.len()
    }
}

fn rank(policy: DedupPolicy, a: &Observation, b: &Observation) -> Ordering {
    match policy {
        DedupPolicy::QualityThenRecency => a.rank_quality_first(b),
        DedupPolicy::RecencyThenQuality => a.rank_recency_first(b),
    }
}

/// Keep exactly one row per (organization, metric, site, period_start)
///
/// Selection is a total order over the rows of a key, so the outcome does
/// not depend on input order.
pub fn deduplicate(rows: Vec<Observation>, policy: DedupPolicy) -> DedupOutcome {
    let mut groups: HashMap<ObservationKey, Vec<Observation>> = HashMap::new();
    for row in rows {
        groups.entry(row.key()).or_default().push(row);
    }

    let mut keys: Vec<ObservationKey> = groups.keys().copied().collect();
    keys.sort();

    let mut outcome = DedupOutcome::default();
    for key in keys {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        group.sort_by(|a, b| rank(policy, b, a));
        let mut rows = group.into_iter();
        if let Some(best) = rows.next() {
            outcome.kept.push(best);
        }
        outcome.discarded.extend(rows);
    }
    outcome
}
