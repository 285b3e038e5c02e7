//! Observation store adapter interface
//!
//! The store is the only component that touches observation persistence.
//! Reads are paginated and callers must walk every page; writes are upserts
//! on the observation uniqueness key.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::types::Observation;
use crate::error::{PlanningError, PlanningResult};

/// Filter for an observation fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationQuery {
    /// Organization scope
    pub organization_id: Uuid,
    /// Restrict to these metrics, `None` for all
    pub metric_ids: Option<Vec<Uuid>>,
    /// Restrict to one site, `None` for every site
    pub site_id: Option<Uuid>,
    /// First `period_start` included
    pub start: NaiveDate,
    /// Last `period_start` included
    pub end: NaiveDate,
}

impl ObservationQuery {
    /// Create a query over an inclusive date window
    pub fn new(organization_id: Uuid, start: NaiveDate, end: NaiveDate) -> PlanningResult<Self> {
        if start > end {
            return Err(PlanningError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            organization_id,
            metric_ids: None,
            site_id: None,
            start,
            end,
        })
    }

    /// Restrict to `metric_ids`
    pub fn with_metrics(mut self, metric_ids: Vec<Uuid>) -> Self {
        self.metric_ids = Some(metric_ids);
        self
    }

    /// Restrict to one site, `None` for every site
    pub fn with_site(mut self, site_id: Option<Uuid>) -> Self {
        self.site_id = site_id;
        self
    }

    /// Whether `observation` falls inside this query
    pub fn matches(&self, observation: &Observation) -> bool {
        observation.organization_id == self.organization_id
            && observation.period_start >= self.start
            && observation.period_start <= self.end
            && self
                .metric_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&observation.metric_id))
            && self
                .site_id
                .map_or(true, |site| observation.site_id == Some(site))
    }
}

/// Page cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Rows to skip
    pub offset: usize,
    /// Requested page size; adapters may return fewer rows
    pub limit: usize,
}

/// One page of rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationPage {
    /// Rows in store order
    pub rows: Vec<Observation>,
    /// Offset of the next page, `None` when exhausted
    pub next_offset: Option<usize>,
}

/// Counts returned by an upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    /// New keys written
    pub inserted: usize,
    /// Existing keys replaced
    pub replaced: usize,
    /// Rows not written because a higher-quality row holds the key
    pub skipped: usize,
}

/// Paginated observation persistence
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Fetch one page of rows matching `query`
    async fn fetch_page(
        &self,
        query: &ObservationQuery,
        page: PageRequest,
    ) -> PlanningResult<ObservationPage>;

    /// Count rows matching `query`, independently of pagination
    async fn count(&self, query: &ObservationQuery) -> PlanningResult<usize>;

    /// Insert or replace rows keyed by (organization, metric, site, period_start)
    async fn upsert(&self, rows: Vec<Observation>) -> PlanningResult<UpsertSummary>;

    /// Delete rows by id, returning how many were removed
    async fn delete(&self, ids: &[Uuid]) -> PlanningResult<usize>;
}

/// Walk every page of `query`
///
/// Stops only when the store reports no further page. A cursor that fails to
/// advance is an error rather than a silent truncation.
pub async fn fetch_all(
    store: &dyn ObservationStore,
    query: &ObservationQuery,
    page_size: usize,
) -> PlanningResult<Vec<Observation>> {
    if page_size == 0 {
        return Err(PlanningError::Pagination {
            reason: "page size must be positive".to_string(),
        });
    }

    let mut rows = Vec::new();
    let mut offset = 0usize;
    let mut pages = 0usize;

    loop {
        let page = store
            .fetch_page(
                query,
                PageRequest {
                    offset,
                    limit: page_size,
                },
            )
            .await?;
        pages += 1;
        let fetched = page.rows.len();
        rows.extend(page.rows);

        match page.next_offset {
            None => break,
            Some(next) if next <= offset || fetched == 0 => {
                return Err(PlanningError::Pagination {
                    reason: format!(
                        "cursor did not advance (offset {}, next {}, rows {})",
                        offset, next, fetched
                    ),
                });
            }
            Some(next) => offset = next,
        }
    }

    debug!(
        organization_id = %query.organization_id,
        rows = rows.len(),
        pages,
        "Fetched observation window"
    );
    Ok(rows)
}
