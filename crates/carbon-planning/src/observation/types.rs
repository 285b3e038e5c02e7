//! Core observation types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::metadata::ObservationMetadata;
use crate::error::PlanningResult;
use crate::period::YearMonth;
use crate::units::Unit;

/// Provenance of an observed value, ordered from least to most trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    /// Estimated from proxies
    Estimated,
    /// Calculated (forecasts, derived values)
    Calculated,
    /// Metered or invoiced
    Measured,
}

impl std::fmt::Display for DataQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataQuality::Estimated => write!(f, "estimated"),
            DataQuality::Calculated => write!(f, "calculated"),
            DataQuality::Measured => write!(f, "measured"),
        }
    }
}

/// Uniqueness key of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    /// Owning organization
    pub organization_id: Uuid,
    /// Metric measured
    pub metric_id: Uuid,
    /// Site, `None` for organization-wide rows
    pub site_id: Option<Uuid>,
    /// First day of the observed period
    pub period_start: NaiveDate,
}

/// Raw metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row identifier
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Catalog metric
    pub metric_id: Uuid,
    /// Site, `None` for organization-wide rows
    pub site_id: Option<Uuid>,
    /// First day covered
    pub period_start: NaiveDate,
    /// Last day covered
    pub period_end: NaiveDate,
    /// Activity value in `unit`
    pub value: f64,
    /// Unit of `value`
    pub unit: Unit,
    /// Emissions in kilograms CO2e
    pub co2e_emissions: f64,
    /// Provenance
    pub data_quality: DataQuality,
    /// When the row was verified, if ever
    pub verified_at: Option<DateTime<Utc>>,
    /// Producer-specific metadata
    #[serde(default)]
    pub metadata: ObservationMetadata,
}

impl Observation {
    /// Create a measured monthly observation covering all of `month`
    pub fn monthly(
        organization_id: Uuid,
        metric_id: Uuid,
        site_id: Option<Uuid>,
        month: YearMonth,
        value: f64,
        unit: Unit,
        co2e_emissions: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            metric_id,
            site_id,
            period_start: month.first_day(),
            period_end: month.last_day(),
            value,
            unit,
            co2e_emissions,
            data_quality: DataQuality::Measured,
            verified_at: None,
            metadata: ObservationMetadata::None,
        }
    }

    /// Set the data quality
    pub fn with_quality(mut self, data_quality: DataQuality) -> Self {
        self.data_quality = data_quality;
        self
    }

    /// Set the verification time
    pub fn with_verified_at(mut self, verified_at: DateTime<Utc>) -> Self {
        self.verified_at = Some(verified_at);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: ObservationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Uniqueness key
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            organization_id: self.organization_id,
            metric_id: self.metric_id,
            site_id: self.site_id,
            period_start: self.period_start,
        }
    }

    /// Month the observation is attributed to
    pub fn month(&self) -> YearMonth {
        YearMonth::from_date(self.period_start)
    }

    /// Whether the row holds a persisted projection rather than an actual
    pub fn is_forecast(&self) -> bool {
        matches!(self.metadata, ObservationMetadata::Forecast(_))
    }

    /// Check invariants enforced on the write path
    pub fn validate(&self) -> PlanningResult<()> {
        if self.period_end < self.period_start {
            return Err(crate::error::PlanningError::InvalidRange {
                start: self.period_start.to_string(),
                end: self.period_end.to_string(),
            });
        }
        if !self.value.is_finite() || !self.co2e_emissions.is_finite() {
            return Err(crate::error::PlanningError::InvalidMetadata {
                reason: format!("non-finite value on observation {}", self.id),
            });
        }
        self.metadata.validate()
    }

    /// Retention order among rows sharing a key: `Greater` means keep `self`
    /// under quality-first ranking
    pub fn rank_quality_first(&self, other: &Observation) -> Ordering {
        self.data_quality
            .cmp(&other.data_quality)
            .then_with(|| self.verified_at.cmp(&other.verified_at))
            .then_with(|| other.id.cmp(&self.id))
    }

    /// Retention order under recency-first ranking
    pub fn rank_recency_first(&self, other: &Observation) -> Ordering {
        self.verified_at
            .cmp(&other.verified_at)
            .then_with(|| self.data_quality.cmp(&other.data_quality))
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Observation {
        Observation::monthly(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            YearMonth::new(2024, 5).unwrap(),
            1200.0,
            Unit::Kwh,
            250.0,
        )
    }

    #[test]
    fn test_data_quality_ordering() {
        assert!(DataQuality::Measured > DataQuality::Calculated);
        assert!(DataQuality::Calculated > DataQuality::Estimated);
    }

    #[test]
    fn test_monthly_constructor_covers_month() {
        let obs = sample();
        assert_eq!(obs.period_start, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(obs.period_end, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        assert_eq!(obs.month().to_string(), "2024-05");
        assert!(obs.validate().is_ok());
    }

    #[test]
    fn test_quality_first_ranking() {
        let measured = sample();
        let mut estimated = measured.clone().with_quality(DataQuality::Estimated);
        estimated.id = Uuid::new_v4();
        let estimated = estimated.with_verified_at(Utc::now());
        assert_eq!(measured.rank_quality_first(&estimated), Ordering::Greater);
        assert_eq!(measured.rank_recency_first(&estimated), Ordering::Less);
    }

    #[test]
    fn test_inverted_period_rejected() {
        let mut obs = sample();
        obs.period_end = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert!(obs.validate().is_err());
    }
}
