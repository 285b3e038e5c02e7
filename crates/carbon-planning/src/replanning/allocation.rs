//! Budget reallocation and initiative application
//!
//! Everything here is pure over a fetched plan so a run can be abandoned at
//! any point before the commit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::types::{MetricTarget, MonthlyTargetAllocation, ReductionInitiative};
use crate::error::{PlanningError, PlanningResult};
use crate::period::YearMonth;

const REDUCTION_EPSILON: f64 = 1e-9;

/// A metric target with its monthly allocations, ordered by month
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPlan {
    /// Plan version
    pub metric_target: MetricTarget,
    /// Monthly allocations, ascending
    pub allocations: Vec<MonthlyTargetAllocation>,
}

impl MetricPlan {
    /// Sum of planned emissions over every month
    pub fn total_planned(&self) -> f64 {
        self.allocations.iter().map(|a| a.planned_emissions).sum()
    }

    /// Months strictly after `cutoff`
    pub fn remaining_months(&self, cutoff: YearMonth) -> usize {
        self.allocations.iter().filter(|a| a.month > cutoff).count()
    }

    /// Budget already used through `cutoff`: actuals, planned where no actual exists
    pub fn consumed(&self, cutoff: YearMonth) -> f64 {
        self.allocations
            .iter()
            .filter(|a| a.month <= cutoff)
            .map(|a| a.actual_emissions.unwrap_or(a.planned_emissions))
            .sum()
    }

    /// Remaining months times the trailing average monthly actual
    ///
    /// Falls back to a twelfth of baseline emissions when no actual exists.
    pub fn remaining_potential(&self, cutoff: YearMonth, trailing_months: usize) -> f64 {
        let recent: Vec<f64> = self
            .allocations
            .iter()
            .rev()
            .filter(|a| a.month <= cutoff)
            .filter_map(|a| a.actual_emissions)
            .take(trailing_months)
            .collect();
        let monthly = if recent.is_empty() {
            self.metric_target.baseline_emissions / 12.0
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        };
        self.remaining_months(cutoff) as f64 * monthly
    }

    /// Replace the metric target and re-key allocations onto it
    pub fn rebind(mut self, metric_target: MetricTarget) -> Self {
        for allocation in self.allocations.iter_mut() {
            allocation.id = Uuid::new_v4();
            allocation.metric_target_id = metric_target.id;
        }
        self.metric_target = metric_target;
        self
    }
}

/// Budget figures of one reallocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    /// Sum of planned allocations, conserved
    pub total_budget: f64,
    /// Actuals through the cutoff, planned where no actual exists
    pub consumed: f64,
    /// `total_budget - consumed`
    pub remaining_budget: f64,
    /// Expected emissions over remaining months at current pace
    pub remaining_potential: f64,
    /// `remaining_potential - remaining_budget`
    pub remaining_reduction: f64,
}

/// Initiative with the metric it targets resolved
#[derive(Debug, Clone, PartialEq)]
pub struct InitiativeAssignment {
    /// `None` for a cross-cutting initiative
    pub metric_id: Option<Uuid>,
    /// Initiative being applied
    pub initiative: ReductionInitiative,
}

/// Redistribute the remaining budget across metrics
///
/// Elapsed months with an actual are fixed at that actual. Each metric gets
/// `remaining_budget * weight / sum(weights)` spread over its remaining
/// months in the shape of its current plan.
pub fn reallocate(
    plans: &[MetricPlan],
    cutoff: YearMonth,
    weights: &[f64],
    remaining_potential: f64,
    tolerance: f64,
    target_id: Uuid,
) -> PlanningResult<(Vec<MetricPlan>, BudgetSummary)> {
    let total_budget: f64 = plans.iter().map(|p| p.total_planned()).sum();
    let consumed: f64 = plans.iter().map(|p| p.consumed(cutoff)).sum();
    let remaining_budget = total_budget - consumed;
    let abs_tolerance = tolerance * total_budget.abs().max(1.0);

    if remaining_budget < -abs_tolerance {
        return Err(PlanningError::RemainingBudgetExhausted {
            target_id,
            remaining: remaining_budget,
        });
    }
    let budget = remaining_budget.max(0.0);

    let mut effective: Vec<f64> = plans
        .iter()
        .zip(weights)
        .map(|(plan, w)| {
            if plan.remaining_months(cutoff) > 0 {
                w.max(0.0)
            } else {
                0.0
            }
        })
        .collect();
    if effective.iter().sum::<f64>() <= 0.0 {
        effective = plans
            .iter()
            .map(|p| if p.remaining_months(cutoff) > 0 { 1.0 } else { 0.0 })
            .collect();
    }
    let weight_sum: f64 = effective.iter().sum();

    let mut replanned = Vec::with_capacity(plans.len());
    for (plan, weight) in plans.iter().zip(&effective) {
        let mut plan = plan.clone();
        let share = if weight_sum > 0.0 {
            budget * weight / weight_sum
        } else {
            0.0
        };

        let remaining = plan.remaining_months(cutoff);
        let shape: f64 = plan
            .allocations
            .iter()
            .filter(|a| a.month > cutoff)
            .map(|a| a.planned_emissions.max(0.0))
            .sum();

        for allocation in plan.allocations.iter_mut() {
            if allocation.month <= cutoff {
                if let Some(actual) = allocation.actual_emissions {
                    allocation.absorb_actual(actual);
                }
                continue;
            }
            let planned = if shape > 0.0 {
                share * allocation.planned_emissions.max(0.0) / shape
            } else {
                share / remaining as f64
            };
            allocation.planned_emissions = planned;
            allocation.initiative_reduction = 0.0;
            allocation.target_emissions = planned;
            allocation.actual_emissions = None;
            allocation.variance = None;
        }
        replanned.push(plan);
    }

    let allocated: f64 = replanned.iter().map(|p| p.total_planned()).sum();
    if (allocated - total_budget).abs() > abs_tolerance {
        return Err(PlanningError::AllocationConservationViolation {
            expected: total_budget,
            actual: allocated,
            tolerance: abs_tolerance,
        });
    }

    Ok((
        replanned,
        BudgetSummary {
            total_budget,
            consumed,
            remaining_budget,
            remaining_potential,
            remaining_reduction: remaining_potential - remaining_budget,
        },
    ))
}

/// Per-month initiative reduction for each plan, for months after `after`
///
/// Metric-specific initiatives reduce their own metric; cross-cutting ones
/// are split by each metric's planned share of that month.
pub fn initiative_reductions(
    plans: &[MetricPlan],
    assignments: &[InitiativeAssignment],
    after: Option<YearMonth>,
) -> Vec<BTreeMap<YearMonth, f64>> {
    let months: BTreeSet<YearMonth> = plans
        .iter()
        .flat_map(|p| p.allocations.iter().map(|a| a.month))
        .filter(|m| after.map_or(true, |cutoff| *m > cutoff))
        .collect();

    let mut reductions: Vec<BTreeMap<YearMonth, f64>> = vec![BTreeMap::new(); plans.len()];
    for month in months {
        let planned: Vec<Option<f64>> = plans
            .iter()
            .map(|p| {
                p.allocations
                    .iter()
                    .find(|a| a.month == month)
                    .map(|a| a.planned_emissions.max(0.0))
            })
            .collect();
        let covering = planned.iter().filter(|p| p.is_some()).count();
        let month_total: f64 = planned.iter().flatten().sum();

        let cross_cutting: f64 = assignments
            .iter()
            .filter(|a| a.metric_id.is_none())
            .map(|a| a.initiative.monthly_reduction(month))
            .sum();

        for (i, plan) in plans.iter().enumerate() {
            let Some(own_planned) = planned[i] else {
                continue;
            };
            let direct: f64 = assignments
                .iter()
                .filter(|a| a.metric_id == Some(plan.metric_target.metric_id))
                .map(|a| a.initiative.monthly_reduction(month))
                .sum();
            let share = if month_total > 0.0 {
                own_planned / month_total
            } else {
                1.0 / covering as f64
            };
            reductions[i].insert(month, direct + cross_cutting * share);
        }
    }
    reductions
}

/// Apply initiative reductions to months after `after`
pub fn apply_initiatives(
    plans: &mut [MetricPlan],
    assignments: &[InitiativeAssignment],
    after: Option<YearMonth>,
) {
    let reductions = initiative_reductions(plans, assignments, after);
    for (plan, months) in plans.iter_mut().zip(reductions) {
        for allocation in plan.allocations.iter_mut() {
            if let Some(reduction) = months.get(&allocation.month) {
                allocation.set_initiative_reduction(*reduction);
            }
        }
    }
}

/// Whether applying the initiatives would change any month after `after`
pub fn initiatives_changed(
    plans: &[MetricPlan],
    assignments: &[InitiativeAssignment],
    after: Option<YearMonth>,
) -> bool {
    let reductions = initiative_reductions(plans, assignments, after);
    plans.iter().zip(reductions).any(|(plan, months)| {
        plan.allocations.iter().any(|allocation| {
            months.get(&allocation.month).map_or(false, |reduction| {
                (allocation.initiative_reduction - reduction).abs() > REDUCTION_EPSILON
            })
        })
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::replanning::types::{InitiativeStatus, MetricTargetStatus};
    use crate::units::Unit;
    use approx::assert_relative_eq;
    use chrono::Utc;

    pub(crate) fn plan_with(year: i32, planned: &[f64]) -> MetricPlan {
        let metric_target = MetricTarget {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            metric_id: Uuid::new_v4(),
            version: 1,
            supersedes: None,
            baseline_value: 0.0,
            value_unit: Unit::Kwh,
            baseline_emissions: planned.iter().sum(),
            target_value: 0.0,
            target_emissions: 0.0,
            status: MetricTargetStatus::Active,
            created_at: Utc::now(),
        };
        let start = YearMonth::first_of_year(year);
        let allocations = planned
            .iter()
            .enumerate()
            .map(|(i, p)| MonthlyTargetAllocation::new(metric_target.id, start.add_months(i as i64), *p))
            .collect();
        MetricPlan {
            metric_target,
            allocations,
        }
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_budget_is_conserved() {
        let mut a = plan_with(2025, &[100.0; 12]);
        let b = plan_with(2025, &[50.0; 12]);
        for allocation in a.allocations.iter_mut().take(6) {
            allocation.set_actual(Some(120.0));
        }
        let plans = vec![a, b];
        let budget: f64 = plans.iter().map(|p| p.total_planned()).sum();

        let (replanned, summary) =
            reallocate(&plans, ym(2025, 6), &[1.0, 1.0], 0.0, 1e-9, Uuid::new_v4()).unwrap();

        let allocated: f64 = replanned.iter().map(|p| p.total_planned()).sum();
        assert_relative_eq!(allocated, budget, epsilon = 1e-6);
        assert_relative_eq!(summary.total_budget, 1800.0);
        assert_relative_eq!(summary.consumed, 720.0 + 300.0);
        assert_relative_eq!(summary.remaining_budget, 780.0);
        assert_eq!(replanned[0].allocations[0].planned_emissions, 120.0);
        assert_relative_eq!(replanned[0].allocations[6].planned_emissions, 65.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exhausted_budget_fails() {
        let mut plan = plan_with(2025, &[10.0; 12]);
        for allocation in plan.allocations.iter_mut().take(2) {
            allocation.set_actual(Some(100.0));
        }
        let result = reallocate(&[plan], ym(2025, 2), &[1.0], 0.0, 1e-9, Uuid::new_v4());
        assert!(matches!(result, Err(PlanningError::RemainingBudgetExhausted { .. })));
    }

    #[test]
    fn test_cross_cutting_initiative_split_by_share() {
        let mut plans = vec![plan_with(2026, &[300.0; 12]), plan_with(2026, &[100.0; 12])];
        let mut initiative =
            ReductionInitiative::new(plans[0].metric_target.organization_id, None, "Solar PPA", 2026, 480.0);
        initiative.status = InitiativeStatus::Active;
        let assignments = vec![InitiativeAssignment {
            metric_id: None,
            initiative,
        }];

        assert!(initiatives_changed(&plans, &assignments, None));
        apply_initiatives(&mut plans, &assignments, None);
        assert_relative_eq!(plans[0].allocations[0].initiative_reduction, 30.0);
        assert_relative_eq!(plans[1].allocations[0].initiative_reduction, 10.0);
        assert_relative_eq!(plans[1].allocations[0].target_emissions, 90.0);
        assert!(!initiatives_changed(&plans, &assignments, None));
    }

    #[test]
    fn test_remaining_potential_uses_trailing_actuals() {
        let mut plan = plan_with(2025, &[100.0; 12]);
        plan.allocations[0].set_actual(Some(60.0));
        plan.allocations[1].set_actual(Some(80.0));
        assert_relative_eq!(plan.remaining_potential(ym(2025, 2), 12), 700.0);
        assert_relative_eq!(plan.remaining_potential(ym(2025, 2), 1), 800.0);
    }
}
