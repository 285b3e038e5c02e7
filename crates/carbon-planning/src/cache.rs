//! Per-run aggregation cache
//!
//! A cache lives for one organization run and is passed explicitly into the
//! calls that use it. Entries expire after the configured TTL.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::aggregator::AggregationReport;

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Aggregation results reused within one organization run
pub struct RunCache {
    organization_id: Uuid,
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, AggregationReport)>>,
}

impl RunCache {
    /// Empty cache for one organization run
    pub fn new(organization_id: Uuid, ttl: Duration) -> Self {
        Self {
            organization_id,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Empty cache with the configured TTL
    pub fn from_config(organization_id: Uuid, config: &CacheConfig) -> Self {
        Self::new(organization_id, Duration::from_secs(config.ttl_secs))
    }

    /// Organization this cache serves
    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// Fresh entry for `key`, dropping it if expired
    pub fn get(&self, key: &str) -> Option<AggregationReport> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored, report)) if stored.elapsed() < self.ttl => Some(report.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `report` under `key`, replacing any earlier entry
    pub fn insert(&self, key: String, report: AggregationReport) {
        self.entries.lock().insert(key, (Instant::now(), report));
    }

    /// Drop every entry, e.g. after a write that changes observations
    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entry
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AggregationReport {
        AggregationReport {
            series_id: "org/all/all-sites".to_string(),
            aggregates: Vec::new(),
            rows_fetched: 3,
            duplicates_discarded: 0,
            forecasts_excluded: 0,
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = RunCache::new(Uuid::new_v4(), Duration::from_secs(60));
        cache.insert("k".to_string(), report());
        assert_eq!(cache.get("k").map(|r| r.rows_fetched), Some(3));
        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = RunCache::new(Uuid::new_v4(), Duration::ZERO);
        cache.insert("k".to_string(), report());
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }
}
