//! Monthly aggregation over the observation store

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::AggregatorConfig;
use super::dedup::{deduplicate, DedupOutcome};
use super::types::{AggregationReport, AggregationRequest, MetricFilter, MonthlyAggregate};
use crate::cache::RunCache;
use crate::error::{PlanningError, PlanningResult};
use crate::observation::{
    fetch_all, MetricCatalog, MetricDefinition, Observation, ObservationQuery, ObservationStore,
};
use crate::period::YearMonth;
use crate::units::Unit;

#[derive(Default)]
struct MonthBucket {
    value: f64,
    emissions: f64,
    count: usize,
}

/// Groups raw observations into monthly totals
pub struct Aggregator {
    store: Arc<dyn ObservationStore>,
    catalog: Arc<dyn MetricCatalog>,
    config: Arc<AggregatorConfig>,
}

impl Aggregator {
    /// Create a new aggregator
    pub fn new(
        store: Arc<dyn ObservationStore>,
        catalog: Arc<dyn MetricCatalog>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config: Arc::new(config),
        }
    }

    /// Aggregation configuration
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregate observations into one value per month in `start..=end`
    pub async fn aggregate(
        &self,
        organization_id: Uuid,
        filter: &MetricFilter,
        start: YearMonth,
        end: YearMonth,
        site_id: Option<Uuid>,
    ) -> PlanningResult<AggregationReport> {
        let request =
            AggregationRequest::new(organization_id, filter.clone(), start, end, site_id)?;
        self.run(&request).await
    }

    /// Aggregate through a run cache, reusing an earlier identical request
    ///
    /// The cache must belong to the request's organization.
    pub async fn aggregate_cached(
        &self,
        cache: &RunCache,
        request: &AggregationRequest,
    ) -> PlanningResult<AggregationReport> {
        if cache.organization_id() != request.organization_id {
            return Err(PlanningError::CacheScopeMismatch {
                cache_organization_id: cache.organization_id(),
                organization_id: request.organization_id,
            });
        }
        let key = request.cache_key();
        if let Some(report) = cache.get(&key) {
            debug!(series_id = %report.series_id, "Aggregation served from run cache");
            return Ok(report);
        }
        let report = self.run(request).await?;
        cache.insert(key, report.clone());
        Ok(report)
    }

    async fn run(&self, request: &AggregationRequest) -> PlanningResult<AggregationReport> {
        let metrics = self.resolve_metrics(&request.filter).await?;
        let series_id = request.series_id();

        if metrics.is_empty() {
            debug!(series_id = %series_id, "No metrics selected, returning gap months");
            return Ok(AggregationReport {
                series_id,
                aggregates: self.assemble(request, &metrics, BTreeMap::new()),
                rows_fetched: 0,
                duplicates_discarded: 0,
                forecasts_excluded: 0,
            });
        }

        let query = ObservationQuery::new(
            request.organization_id,
            request.start.first_day(),
            request.end.last_day(),
        )?
        .with_metrics(metrics.keys().copied().collect())
        .with_site(request.site_id);

        let rows = fetch_all(self.store.as_ref(), &query, self.config.page_size).await?;
        let rows_fetched = rows.len();

        let (rows, forecasts_excluded) = if self.config.exclude_forecasts {
            let before = rows.len();
            let actuals: Vec<Observation> = rows.into_iter().filter(|r| !r.is_forecast()).collect();
            let excluded = before - actuals.len();
            (actuals, excluded)
        } else {
            (rows, 0)
        };

        let outcome = deduplicate(rows, self.config.dedup_policy);
        if outcome.discarded_count() > 0 {
            warn!(
                series_id = %series_id,
                discarded = outcome.discarded_count(),
                policy = ?self.config.dedup_policy,
                "Discarded duplicate observations during aggregation"
            );
        }

        let mut buckets: BTreeMap<YearMonth, MonthBucket> = BTreeMap::new();
        for row in &outcome.kept {
            let metric = metrics
                .get(&row.metric_id)
                .ok_or(PlanningError::MetricNotFound {
                    metric_id: row.metric_id,
                })?;
            if !row.unit.is_compatible_with(metric.unit) {
                return Err(PlanningError::UnitMismatch {
                    metric_id: row.metric_id,
                    expected: metric.unit.to_string(),
                    found: row.unit.to_string(),
                });
            }
            let bucket = buckets.entry(row.month()).or_default();
            bucket.value += row.unit.to_canonical(row.value);
            bucket.emissions += row.co2e_emissions;
            bucket.count += 1;
        }

        let aggregates = self.assemble(request, &metrics, buckets);

        info!(
            series_id = %series_id,
            months = aggregates.len(),
            rows_fetched,
            duplicates = outcome.discarded_count(),
            forecasts_excluded,
            "Aggregated observations"
        );

        Ok(AggregationReport {
            series_id,
            aggregates,
            rows_fetched,
            duplicates_discarded: outcome.discarded_count(),
            forecasts_excluded,
        })
    }

    /// Expand buckets into one aggregate per month, gaps included
    fn assemble(
        &self,
        request: &AggregationRequest,
        metrics: &HashMap<Uuid, MetricDefinition>,
        buckets: BTreeMap<YearMonth, MonthBucket>,
    ) -> Vec<MonthlyAggregate> {
        let canonical_units: HashSet<Unit> = metrics.values().map(|m| m.unit.canonical()).collect();
        let value_unit = if canonical_units.len() == 1 {
            canonical_units.into_iter().next()
        } else {
            None
        };

        let mut scopes = metrics.values().map(|m| m.scope);
        let scope = match scopes.next() {
            Some(first) if scopes.all(|s| s == first) => Some(first),
            _ => None,
        };

        let metric_id = if metrics.len() == 1 {
            metrics.keys().next().copied()
        } else {
            None
        };

        YearMonth::range_inclusive(request.start, request.end)
            .map(|month| {
                let bucket = buckets.get(&month);
                MonthlyAggregate {
                    organization_id: request.organization_id,
                    metric_id,
                    scope,
                    site_id: request.site_id,
                    month,
                    total_value: value_unit.map(|_| bucket.map_or(0.0, |b| b.value)),
                    value_unit,
                    total_emissions: bucket.map_or(0.0, |b| b.emissions),
                    emissions_unit: Unit::KgCo2e,
                    observation_count: bucket.map_or(0, |b| b.count),
                }
            })
            .collect()
    }

    async fn resolve_metrics(
        &self,
        filter: &MetricFilter,
    ) -> PlanningResult<HashMap<Uuid, MetricDefinition>> {
        let metrics = match filter {
            MetricFilter::Metrics(ids) => {
                let mut metrics = Vec::with_capacity(ids.len());
                for id in ids {
                    metrics.push(self.catalog.lookup(*id).await?);
                }
                metrics
            }
            _ => self
                .catalog
                .list()
                .await?
                .into_iter()
                .filter(|m| filter.selects(m))
                .collect(),
        };
        Ok(metrics.into_iter().map(|m| (m.id, m)).collect())
    }

    /// Report duplicate rows in a window without touching the store
    pub async fn find_duplicates(
        &self,
        organization_id: Uuid,
        start: YearMonth,
        end: YearMonth,
    ) -> PlanningResult<DedupOutcome> {
        let query = ObservationQuery::new(organization_id, start.first_day(), end.last_day())?;
        let rows = fetch_all(self.store.as_ref(), &query, self.config.page_size).await?;
        Ok(deduplicate(rows, self.config.dedup_policy))
    }

    /// Delete every duplicate row that loses under the configured policy
    pub async fn purge_duplicates(
        &self,
        organization_id: Uuid,
        start: YearMonth,
        end: YearMonth,
    ) -> PlanningResult<usize> {
        let outcome = self.find_duplicates(organization_id, start, end).await?;
        if outcome.discarded.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = outcome.discarded.iter().map(|r| r.id).collect();
        let removed = self.store.delete(&ids).await?;
        info!(
            organization_id = %organization_id,
            removed,
            "Purged duplicate observations"
        );
        Ok(removed)
    }
}
