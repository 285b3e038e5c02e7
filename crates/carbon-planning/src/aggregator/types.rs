//! Aggregation request and output types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{PlanningError, PlanningResult};
use crate::observation::{EmissionScope, MetricCategory, MetricDefinition};
use crate::period::YearMonth;
use crate::units::Unit;

/// Selects which metrics an aggregate covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum MetricFilter {
    /// Every metric in the catalog
    All,
    /// Metrics of one GHG scope
    Scope(EmissionScope),
    /// Metrics of one category
    Category(MetricCategory),
    /// Explicit metric ids
    Metrics(Vec<Uuid>),
}

impl MetricFilter {
    /// Whether a catalog entry is selected
    pub fn selects(&self, metric: &MetricDefinition) -> bool {
        match self {
            MetricFilter::All => true,
            MetricFilter::Scope(scope) => metric.scope == *scope,
            MetricFilter::Category(category) => metric.category == *category,
            MetricFilter::Metrics(ids) => ids.contains(&metric.id),
        }
    }

    /// Filter for a single metric
    pub fn metric(metric_id: Uuid) -> Self {
        MetricFilter::Metrics(vec![metric_id])
    }
}

impl fmt::Display for MetricFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricFilter::All => write!(f, "all"),
            MetricFilter::Scope(scope) => write!(f, "scope:{:?}", scope),
            MetricFilter::Category(category) => write!(f, "category:{:?}", category),
            MetricFilter::Metrics(ids) if ids.len() == 1 => write!(f, "metric:{}", ids[0]),
            MetricFilter::Metrics(ids) => write!(f, "metrics:{}", ids.len()),
        }
    }
}

/// Parameters of one aggregation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Organization aggregated
    pub organization_id: Uuid,
    /// Metrics included
    pub filter: MetricFilter,
    /// First month, inclusive
    pub start: YearMonth,
    /// Last month, inclusive
    pub end: YearMonth,
    /// Single site, `None` for the union of all sites
    pub site_id: Option<Uuid>,
}

impl AggregationRequest {
    /// Request for `start..=end`, `InvalidRange` when start is after end
    pub fn new(
        organization_id: Uuid,
        filter: MetricFilter,
        start: YearMonth,
        end: YearMonth,
        site_id: Option<Uuid>,
    ) -> PlanningResult<Self> {
        if start > end {
            return Err(PlanningError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            organization_id,
            filter,
            start,
            end,
            site_id,
        })
    }

    /// Stable identifier of the aggregated series
    pub fn series_id(&self) -> String {
        let site = self
            .site_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| "all-sites".to_string());
        format!("{}/{}/{}", self.organization_id, self.filter, site)
    }

    /// Key used by the run cache
    pub fn cache_key(&self) -> String {
        format!("aggregate:{}:{}:{}", self.series_id(), self.start, self.end)
    }
}

/// Monthly total for one organization, metric selection and site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    /// Organization aggregated
    pub organization_id: Uuid,
    /// Set when the selection is exactly one metric
    pub metric_id: Option<Uuid>,
    /// Set when every selected metric shares one scope
    pub scope: Option<EmissionScope>,
    /// Site, `None` for every site
    pub site_id: Option<Uuid>,
    /// Calendar month
    pub month: YearMonth,
    /// Activity total; `None` when the selection spans several dimensions
    pub total_value: Option<f64>,
    /// Unit of `total_value`
    pub value_unit: Option<Unit>,
    /// Emissions total
    pub total_emissions: f64,
    /// Unit of `total_emissions`
    pub emissions_unit: Unit,
    /// Deduplicated rows that contributed; zero marks a gap month
    pub observation_count: usize,
}

impl MonthlyAggregate {
    /// Month without any contributing observation
    pub fn is_gap(&self) -> bool {
        self.observation_count == 0
    }
}

/// Which quantity of an aggregate a series follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesQuantity {
    /// Activity values (kWh, m3, kg...)
    Activity,
    /// Emissions in kgCO2e
    Emissions,
}

/// Ordered monthly values ready for forecasting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySeries {
    /// Aggregation the series came from
    pub series_id: String,
    /// Month of `values[0]`
    pub start: YearMonth,
    /// Monthly values, gaps as zeros
    pub values: Vec<f64>,
    /// Unit of every value
    pub unit: Unit,
    /// Interior months with no observations, carried as zeros
    pub missing_months: usize,
}

impl MonthlySeries {
    /// Number of months
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no month
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Month of the last value
    pub fn last_month(&self) -> Option<YearMonth> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.start.add_months(self.values.len() as i64 - 1))
        }
    }
}

/// Aggregation output plus data-quality counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationReport {
    /// Identifies the organization, selection and site
    pub series_id: String,
    /// Monthly aggregates, ascending, gaps included
    pub aggregates: Vec<MonthlyAggregate>,
    /// Rows fetched from the store
    pub rows_fetched: usize,
    /// Rows dropped as duplicates
    pub duplicates_discarded: usize,
    /// Persisted forecast rows left out of the totals
    pub forecasts_excluded: usize,
}

impl AggregationReport {
    /// Series of one quantity, trimmed of leading and trailing gap months
    pub fn series(&self, quantity: SeriesQuantity) -> PlanningResult<MonthlySeries> {
        let first = self.aggregates.iter().position(|a| !a.is_gap());
        let last = self.aggregates.iter().rposition(|a| !a.is_gap());

        let unit = match quantity {
            SeriesQuantity::Emissions => Some(Unit::KgCo2e),
            SeriesQuantity::Activity => self.aggregates.first().and_then(|a| a.value_unit),
        };
        let unit = unit.ok_or_else(|| PlanningError::UnitMismatch {
            metric_id: Uuid::nil(),
            expected: "a single activity dimension".to_string(),
            found: format!("mixed dimensions in {}", self.series_id),
        })?;

        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                let start = self
                    .aggregates
                    .first()
                    .map(|a| a.month)
                    .ok_or_else(|| PlanningError::InvalidRange {
                        start: self.series_id.clone(),
                        end: "empty aggregation".to_string(),
                    })?;
                return Ok(MonthlySeries {
                    series_id: self.series_id.clone(),
                    start,
                    values: Vec::new(),
                    unit,
                    missing_months: 0,
                });
            }
        };

        let window = &self.aggregates[first..=last];
        let values = window
            .iter()
            .map(|a| match quantity {
                SeriesQuantity::Emissions => a.total_emissions,
                SeriesQuantity::Activity => a.total_value.unwrap_or(0.0),
            })
            .collect();

        Ok(MonthlySeries {
            series_id: self.series_id.clone(),
            start: window[0].month,
            values,
            unit,
            missing_months: window.iter().filter(|a| a.is_gap()).count(),
        })
    }

    /// Sum of emissions over all months
    pub fn total_emissions(&self) -> f64 {
        self.aggregates.iter().map(|a| a.total_emissions).sum()
    }
}
