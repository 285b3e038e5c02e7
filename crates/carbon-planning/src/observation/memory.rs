//! In-memory observation store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::{ObservationPage, ObservationQuery, ObservationStore, PageRequest, UpsertSummary};
use super::types::{Observation, ObservationKey};
use crate::error::{PlanningError, PlanningResult};

/// Observation store backed by a vector
///
/// `insert_raw` appends without key checks so legacy data (including
/// duplicates) can be loaded; `upsert` is the keyed write path.
#[derive(Clone, Default)]
pub struct InMemoryObservationStore {
    rows: Arc<RwLock<Vec<Observation>>>,
    /// Hard cap applied to every page regardless of the requested limit
    max_page_size: Option<usize>,
}

impl InMemoryObservationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every page at `max` rows, like a backend with a row limit
    pub fn with_max_page_size(mut self, max: usize) -> Self {
        self.max_page_size = Some(max.max(1));
        self
    }

    /// Append rows without uniqueness checks
    pub fn insert_raw(&self, rows: impl IntoIterator<Item = Observation>) {
        self.rows.write().extend(rows);
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store holds no row
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Snapshot of all rows
    pub fn all(&self) -> Vec<Observation> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl ObservationStore for InMemoryObservationStore {
    async fn fetch_page(
        &self,
        query: &ObservationQuery,
        page: PageRequest,
    ) -> PlanningResult<ObservationPage> {
        let mut matching: Vec<Observation> = self
            .rows
            .read()
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.period_start
                .cmp(&b.period_start)
                .then_with(|| a.metric_id.cmp(&b.metric_id))
                .then_with(|| a.site_id.cmp(&b.site_id))
                .then_with(|| a.id.cmp(&b.id))
        });

        let limit = match self.max_page_size {
            Some(max) => page.limit.min(max),
            None => page.limit,
        };
        let total = matching.len();
        let end = (page.offset + limit).min(total);
        let rows = if page.offset < total {
            matching[page.offset..end].to_vec()
        } else {
            Vec::new()
        };
        let next_offset = if end < total { Some(end) } else { None };

        Ok(ObservationPage { rows, next_offset })
    }

    async fn count(&self, query: &ObservationQuery) -> PlanningResult<usize> {
        Ok(self.rows.read().iter().filter(|row| query.matches(row)).count())
    }

    async fn upsert(&self, rows: Vec<Observation>) -> PlanningResult<UpsertSummary> {
        let mut seen: HashSet<ObservationKey> = HashSet::with_capacity(rows.len());
        for row in &rows {
            row.validate()?;
            if !seen.insert(row.key()) {
                let count = rows.iter().filter(|r| r.key() == row.key()).count();
                return Err(PlanningError::DuplicateObservation {
                    metric_id: row.metric_id,
                    period_start: row.period_start,
                    count,
                });
            }
        }

        let mut summary = UpsertSummary::default();
        let mut stored = self.rows.write();
        for row in rows {
            let key = row.key();
            let best_existing = stored
                .iter()
                .filter(|existing| existing.key() == key)
                .map(|existing| existing.data_quality)
                .max();

            match best_existing {
                Some(quality) if quality > row.data_quality => {
                    debug!(
                        metric_id = %row.metric_id,
                        period_start = %row.period_start,
                        existing = %quality,
                        incoming = %row.data_quality,
                        "Kept higher-quality observation"
                    );
                    summary.skipped += 1;
                }
                Some(_) => {
                    let before = stored.len();
                    stored.retain(|existing| existing.key() != key);
                    if before - stored.len() > 1 {
                        warn!(
                            metric_id = %row.metric_id,
                            period_start = %row.period_start,
                            removed = before - stored.len(),
                            "Upsert collapsed duplicate rows"
                        );
                    }
                    stored.push(row);
                    summary.replaced += 1;
                }
                None => {
                    stored.push(row);
                    summary.inserted += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn delete(&self, ids: &[Uuid]) -> PlanningResult<usize> {
        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut stored = self.rows.write();
        let before = stored.len();
        stored.retain(|row| !ids.contains(&row.id));
        Ok(before - stored.len())
    }
}
