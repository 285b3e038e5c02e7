//! Target and trajectory types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{PlanningError, PlanningResult};
use crate::observation::EmissionScope;
use crate::period::YearMonth;
use crate::units::{Dimension, Unit};

/// Organization-level reduction target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Target id
    pub id: Uuid,
    /// Owning organization
    pub organization_id: Uuid,
    /// Covered scope, `None` for all scopes
    pub scope: Option<EmissionScope>,
    /// Year the reduction is measured from
    pub baseline_year: i32,
    /// Emissions in the baseline year, in `unit`
    pub baseline_value: f64,
    /// Year the target value must be reached
    pub target_year: i32,
    /// Emissions allowed in the target year, in `unit`
    pub target_value: f64,
    /// Emissions unit of both values
    pub unit: Unit,
}

impl Target {
    /// Validated target with a fresh id
    pub fn new(
        organization_id: Uuid,
        scope: Option<EmissionScope>,
        baseline_year: i32,
        baseline_value: f64,
        target_year: i32,
        target_value: f64,
        unit: Unit,
    ) -> PlanningResult<Self> {
        let target = Self {
            id: Uuid::new_v4(),
            organization_id,
            scope,
            baseline_year,
            baseline_value,
            target_year,
            target_value,
            unit,
        };
        target.validate()?;
        Ok(target)
    }

    /// Reduction from baseline to target, in percent
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.baseline_value, self.target_value)
    }

    /// Reject unusable targets with `InvalidTarget`
    pub fn validate(&self) -> PlanningResult<()> {
        if self.unit.dimension() != Dimension::Emissions {
            return Err(PlanningError::InvalidTarget {
                reason: format!("target unit {} is not an emissions unit", self.unit),
            });
        }
        validate_values(
            self.baseline_value,
            self.baseline_year,
            self.target_value,
            self.target_year,
        )
    }

    /// Baseline in kgCO2e
    pub fn baseline_kg(&self) -> f64 {
        self.unit.to_canonical(self.baseline_value)
    }

    /// Target-year allowance in kgCO2e
    pub fn target_kg(&self) -> f64 {
        self.unit.to_canonical(self.target_value)
    }

    /// Last month of the target year
    pub fn final_month(&self) -> YearMonth {
        YearMonth::last_of_year(self.target_year)
    }

    /// First month with a monthly allocation
    pub fn first_planned_month(&self) -> YearMonth {
        YearMonth::first_of_year(self.baseline_year + 1)
    }
}

pub(crate) fn reduction_percent(baseline_value: f64, target_value: f64) -> f64 {
    if baseline_value > 0.0 {
        (baseline_value - target_value) / baseline_value * 100.0
    } else {
        0.0
    }
}

pub(crate) fn validate_values(
    baseline_value: f64,
    baseline_year: i32,
    target_value: f64,
    target_year: i32,
) -> PlanningResult<()> {
    let invalid = |reason: String| Err(PlanningError::InvalidTarget { reason });
    if target_year <= baseline_year {
        return invalid(format!(
            "target year {} must be after baseline year {}",
            target_year, baseline_year
        ));
    }
    if !baseline_value.is_finite() || baseline_value <= 0.0 {
        return invalid(format!("baseline value {} must be positive", baseline_value));
    }
    if !target_value.is_finite() || target_value < 0.0 {
        return invalid(format!("target value {} must not be negative", target_value));
    }
    if target_value > baseline_value {
        return invalid(format!(
            "target value {} exceeds baseline {}",
            target_value, baseline_value
        ));
    }
    Ok(())
}

/// How the required reduction is phased between baseline and target year
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "schedule", rename_all = "snake_case")]
pub enum TrajectoryPolicy {
    /// Equal reduction every year
    #[default]
    Linear,
    /// Cumulative share of the total reduction reached by each listed year,
    /// interpolated linearly in between
    Pathway(BTreeMap<i32, f64>),
}

/// How an annual requirement is spread over months
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "weights", rename_all = "snake_case")]
pub enum MonthlySplit {
    /// One twelfth per month
    #[default]
    Even,
    /// Calendar weights, January first, summing to one
    Seasonal([f64; 12]),
}

impl MonthlySplit {
    /// Weights from an additive seasonal profile around `level`
    ///
    /// Falls back to an even split when the profile leaves no positive month.
    pub fn from_profile(profile: &[f64; 12], level: f64) -> Self {
        let mut weights = [0.0; 12];
        for (weight, component) in weights.iter_mut().zip(profile) {
            *weight = (level + component).max(0.0);
        }
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return MonthlySplit::Even;
        }
        for weight in weights.iter_mut() {
            *weight /= total;
        }
        MonthlySplit::Seasonal(weights)
    }

    /// Share of the annual value falling in calendar month `month0` (0-based)
    pub fn weight(&self, month0: usize) -> f64 {
        match self {
            MonthlySplit::Even => 1.0 / 12.0,
            MonthlySplit::Seasonal(weights) => weights[month0 % 12],
        }
    }
}

/// Required emissions for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyRequirement {
    /// Calendar year
    pub year: i32,
    /// Reduction from baseline required by this year, in percent
    pub required_reduction_percent: f64,
    /// Emissions allowed in the year
    pub required_emissions: f64,
}

/// Required emissions for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRequirement {
    /// Calendar month
    pub month: YearMonth,
    /// Emissions allowed in the month
    pub required_emissions: f64,
}

/// Required path from baseline to target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Year the path starts from
    pub baseline_year: i32,
    /// Year the path ends in
    pub target_year: i32,
    /// Unit of every requirement
    pub unit: Unit,
    /// Baseline year through target year
    pub yearly: Vec<YearlyRequirement>,
    /// January after the baseline year through December of the target year
    pub monthly: Vec<MonthlyRequirement>,
}

impl Trajectory {
    /// Required emissions of `year`
    pub fn required_for_year(&self, year: i32) -> Option<f64> {
        self.yearly
            .iter()
            .find(|y| y.year == year)
            .map(|y| y.required_emissions)
    }

    /// Required emissions of `month`
    pub fn required_for_month(&self, month: YearMonth) -> Option<f64> {
        self.monthly
            .iter()
            .find(|m| m.month == month)
            .map(|m| m.required_emissions)
    }

    /// Cumulative requirement from the first planned month through `month`
    pub fn cumulative_through(&self, month: YearMonth) -> f64 {
        self.monthly
            .iter()
            .take_while(|m| m.month <= month)
            .map(|m| m.required_emissions)
            .sum()
    }

    /// Total requirement over every planned month
    pub fn total(&self) -> f64 {
        self.monthly.iter().map(|m| m.required_emissions).sum()
    }
}
