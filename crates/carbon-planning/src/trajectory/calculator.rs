//! Trajectory calculation

use tracing::debug;

use super::types::{
    reduction_percent, validate_values, MonthlyRequirement, MonthlySplit, Target, Trajectory,
    TrajectoryPolicy, YearlyRequirement,
};
use crate::error::{PlanningError, PlanningResult};
use crate::period::YearMonth;
use crate::units::Unit;

/// Computes required emissions per year and month
#[derive(Debug, Clone, Default)]
pub struct TrajectoryCalculator {
    policy: TrajectoryPolicy,
    split: MonthlySplit,
}

impl TrajectoryCalculator {
    /// Linear policy with an even monthly split
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `policy` to phase the reduction
    pub fn with_policy(mut self, policy: TrajectoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use `split` to spread annual requirements over months
    pub fn with_split(mut self, split: MonthlySplit) -> Self {
        self.split = split;
        self
    }

    /// Share of the total reduction that must be achieved by `year`, in `[0, 1]`
    pub fn progress(&self, baseline_year: i32, target_year: i32, year: i32) -> f64 {
        let span = (target_year - baseline_year) as f64;
        let linear = ((year - baseline_year) as f64 / span).clamp(0.0, 1.0);
        match &self.policy {
            TrajectoryPolicy::Linear => linear,
            TrajectoryPolicy::Pathway(schedule) => {
                if year <= baseline_year {
                    return 0.0;
                }
                if year >= target_year {
                    return 1.0;
                }
                let (y0, f0) = schedule
                    .range(..=year)
                    .next_back()
                    .map(|(y, f)| (*y, *f))
                    .unwrap_or((baseline_year, 0.0));
                let (y1, f1) = schedule
                    .range(year..)
                    .next()
                    .map(|(y, f)| (*y, *f))
                    .unwrap_or((target_year, 1.0));
                if y1 == y0 {
                    f0
                } else {
                    f0 + (f1 - f0) * (year - y0) as f64 / (y1 - y0) as f64
                }
            }
        }
    }

    /// Reduction from baseline required by `year`, in percent
    pub fn required_reduction_percent(
        &self,
        baseline_value: f64,
        baseline_year: i32,
        target_value: f64,
        target_year: i32,
        year: i32,
    ) -> f64 {
        reduction_percent(baseline_value, target_value)
            * self.progress(baseline_year, target_year, year)
    }

    fn validate_policy(&self, baseline_year: i32, target_year: i32) -> PlanningResult<()> {
        let TrajectoryPolicy::Pathway(schedule) = &self.policy else {
            return Ok(());
        };
        let mut previous = 0.0;
        for (year, fraction) in schedule {
            if *year <= baseline_year || *year > target_year {
                return Err(PlanningError::InvalidTarget {
                    reason: format!(
                        "pathway year {} outside {}..={}",
                        year,
                        baseline_year + 1,
                        target_year
                    ),
                });
            }
            if !(0.0..=1.0).contains(fraction) || *fraction < previous {
                return Err(PlanningError::InvalidTarget {
                    reason: format!(
                        "pathway fraction {} at {} must be monotone within [0, 1]",
                        fraction, year
                    ),
                });
            }
            previous = *fraction;
        }
        Ok(())
    }

    /// Required path for raw baseline and target values
    pub fn calculate(
        &self,
        baseline_value: f64,
        baseline_year: i32,
        target_value: f64,
        target_year: i32,
        unit: Unit,
    ) -> PlanningResult<Trajectory> {
        validate_values(baseline_value, baseline_year, target_value, target_year)?;
        self.validate_policy(baseline_year, target_year)?;

        let yearly: Vec<YearlyRequirement> = (baseline_year..=target_year)
            .map(|year| {
                let pct = self.required_reduction_percent(
                    baseline_value,
                    baseline_year,
                    target_value,
                    target_year,
                    year,
                );
                YearlyRequirement {
                    year,
                    required_reduction_percent: pct,
                    required_emissions: baseline_value * (1.0 - pct / 100.0),
                }
            })
            .collect();

        let monthly = yearly
            .iter()
            .filter(|y| y.year > baseline_year)
            .flat_map(|y| {
                YearMonth::range_inclusive(
                    YearMonth::first_of_year(y.year),
                    YearMonth::last_of_year(y.year),
                )
                .map(move |month| MonthlyRequirement {
                    month,
                    required_emissions: y.required_emissions * self.split.weight(month.month0()),
                })
            })
            .collect();

        debug!(
            baseline_year,
            target_year,
            baseline_value,
            target_value,
            "Calculated trajectory"
        );

        Ok(Trajectory {
            baseline_year,
            target_year,
            unit,
            yearly,
            monthly,
        })
    }

    /// Required path for a target, in kgCO2e
    pub fn calculate_for(&self, target: &Target) -> PlanningResult<Trajectory> {
        target.validate()?;
        self.calculate(
            target.baseline_kg(),
            target.baseline_year,
            target.target_kg(),
            target.target_year,
            Unit::KgCo2e,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    #[test]
    fn test_linear_midpoint() {
        let trajectory = TrajectoryCalculator::new()
            .calculate(1000.0, 2023, 500.0, 2033, Unit::TonnesCo2e)
            .unwrap();
        assert_relative_eq!(trajectory.required_for_year(2028).unwrap(), 750.0, epsilon = 1e-9);
        assert_relative_eq!(trajectory.required_for_year(2023).unwrap(), 1000.0);
        assert_relative_eq!(trajectory.required_for_year(2033).unwrap(), 500.0, epsilon = 1e-9);
        assert_eq!(trajectory.monthly.len(), 120);
        assert_eq!(trajectory.monthly[0].month, YearMonth::new(2024, 1).unwrap());
    }

    #[test]
    fn test_monthly_sums_to_annual() {
        let trajectory = TrajectoryCalculator::new()
            .with_split(MonthlySplit::from_profile(
                &[30.0, 20.0, 0.0, -10.0, -20.0, -20.0, -10.0, 0.0, 0.0, 0.0, 10.0, 30.0],
                100.0,
            ))
            .calculate(1200.0, 2020, 600.0, 2026, Unit::KgCo2e)
            .unwrap();
        let year_2023: f64 = trajectory
            .monthly
            .iter()
            .filter(|m| m.month.year() == 2023)
            .map(|m| m.required_emissions)
            .sum();
        assert_relative_eq!(year_2023, trajectory.required_for_year(2023).unwrap(), epsilon = 1e-9);
        assert!(trajectory.monthly[0].required_emissions > trajectory.monthly[5].required_emissions);
    }

    #[test]
    fn test_pathway_front_loads_reduction() {
        let mut schedule = BTreeMap::new();
        schedule.insert(2025, 0.6);
        let calculator = TrajectoryCalculator::new().with_policy(TrajectoryPolicy::Pathway(schedule));
        assert_relative_eq!(calculator.progress(2020, 2030, 2025), 0.6);
        assert_relative_eq!(calculator.progress(2020, 2030, 2028), 0.84, epsilon = 1e-9);
        assert_relative_eq!(calculator.progress(2020, 2030, 2030), 1.0);
    }

    #[test]
    fn test_non_monotone_pathway_rejected() {
        let mut schedule = BTreeMap::new();
        schedule.insert(2024, 0.5);
        schedule.insert(2026, 0.4);
        let result = TrajectoryCalculator::new()
            .with_policy(TrajectoryPolicy::Pathway(schedule))
            .calculate(100.0, 2020, 50.0, 2030, Unit::KgCo2e);
        assert!(matches!(result, Err(PlanningError::InvalidTarget { .. })));
    }

    #[test]
    fn test_invalid_targets_rejected() {
        let calculator = TrajectoryCalculator::new();
        assert!(calculator.calculate(100.0, 2030, 50.0, 2030, Unit::KgCo2e).is_err());
        assert!(calculator.calculate(0.0, 2020, 0.0, 2030, Unit::KgCo2e).is_err());
        assert!(calculator.calculate(100.0, 2020, 150.0, 2030, Unit::KgCo2e).is_err());
        assert!(calculator.calculate(100.0, 2020, -1.0, 2030, Unit::KgCo2e).is_err());
    }
}
