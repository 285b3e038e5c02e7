//! Replanning engine: decomposition, variance detection and reallocation

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::allocation::{
    apply_initiatives, initiatives_changed, reallocate, InitiativeAssignment, MetricPlan,
};
use super::config::{ReplanningConfig, SplitPolicy, WeightingPolicy};
use super::history::HistoryRecorder;
use super::locks::{OrganizationGuard, OrganizationLocks};
use super::metrics::ReplanningMetrics;
use super::store::{PlanCommit, PlanStore, TargetSource};
use super::types::{
    AllocationSnapshot, MetricTarget, MetricTargetStatus, MonthlyTargetAllocation, ReplanOutcome,
    ReplanTrigger, ReplanningEvent,
};
use super::variance::{detect_variance, VarianceReport};
use crate::aggregator::{
    AggregationReport, AggregationRequest, Aggregator, MetricFilter, MonthlySeries, SeriesQuantity,
};
use crate::backends::PlanningBackends;
use crate::cache::RunCache;
use crate::clock::Clock;
use crate::error::{PlanningError, PlanningResult};
use crate::forecast::ForecastEngine;
use crate::observation::MetricCatalog;
use crate::period::YearMonth;
use crate::trajectory::{MonthlySplit, Target, TrajectoryCalculator};
use crate::units::Unit;

const ACTUAL_EPSILON: f64 = 1e-9;

/// Maintains versioned per-metric plans for organization targets
pub struct ReplanningEngine {
    aggregator: Arc<Aggregator>,
    forecast: Arc<ForecastEngine>,
    catalog: Arc<dyn MetricCatalog>,
    targets: Arc<dyn TargetSource>,
    plans: Arc<dyn PlanStore>,
    history: Arc<dyn HistoryRecorder>,
    locks: OrganizationLocks,
    clock: Arc<dyn Clock>,
    config: Arc<ReplanningConfig>,
    metrics: Arc<RwLock<ReplanningMetrics>>,
}

impl ReplanningEngine {
    /// Create a new engine after validating `config`
    pub fn new(
        backends: &PlanningBackends,
        aggregator: Arc<Aggregator>,
        forecast: Arc<ForecastEngine>,
        clock: Arc<dyn Clock>,
        config: ReplanningConfig,
    ) -> PlanningResult<Self> {
        config.validate()?;
        Ok(Self {
            aggregator,
            forecast,
            catalog: backends.catalog.clone(),
            targets: backends.targets.clone(),
            plans: backends.plans.clone(),
            history: backends.history.clone(),
            locks: OrganizationLocks::new(),
            clock,
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(ReplanningMetrics::default())),
        })
    }

    /// Organization locks shared with other jobs that must not overlap a replan
    pub fn locks(&self) -> &OrganizationLocks {
        &self.locks
    }

    /// Engine configuration
    pub fn config(&self) -> &ReplanningConfig {
        &self.config
    }

    /// Get engine metrics
    pub fn get_metrics(&self) -> ReplanningMetrics {
        self.metrics.read().clone()
    }

    /// Run replanning for one target under the organization lock
    ///
    /// A second concurrent call for the same organization fails with
    /// `ConcurrentReplan` without touching any state.
    pub async fn trigger_replan(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
        trigger: ReplanTrigger,
        reason: &str,
        cache: &RunCache,
    ) -> PlanningResult<ReplanOutcome> {
        let guard = match self.locks.try_lock(organization_id) {
            Ok(guard) => guard,
            Err(e) => {
                self.metrics.write().conflicts += 1;
                return Err(e);
            }
        };
        self.replan_locked(&guard, organization_id, target_id, trigger, reason, cache)
            .await
    }

    /// Run replanning while the caller holds the organization lock
    pub async fn replan_locked(
        &self,
        _guard: &OrganizationGuard,
        organization_id: Uuid,
        target_id: Uuid,
        trigger: ReplanTrigger,
        reason: &str,
        cache: &RunCache,
    ) -> PlanningResult<ReplanOutcome> {
        let redelivered = self.deliver_pending(organization_id).await?;
        if redelivered > 0 {
            self.metrics.write().redelivered_events += redelivered as u64;
            warn!(
                organization_id = %organization_id,
                events = redelivered,
                "Recorded replanning events left in the outbox by an earlier run"
            );
        }

        let target = self.targets.get_target(organization_id, target_id).await?;
        target.validate()?;
        let cutoff = self.clock.last_complete_month();
        self.metrics.write().runs += 1;

        debug!(
            organization_id = %organization_id,
            target_id = %target_id,
            trigger = %trigger,
            cutoff = %cutoff,
            "Starting replanning run"
        );

        let versions = self
            .plans
            .list_metric_targets(organization_id, target_id)
            .await?;
        let active: Vec<MetricTarget> = versions
            .iter()
            .filter(|mt| mt.status == MetricTargetStatus::Active)
            .cloned()
            .collect();
        if active.is_empty() && versions.iter().any(|mt| mt.status == MetricTargetStatus::Complete)
        {
            return Ok(ReplanOutcome::Completed);
        }

        let initial = active.is_empty();
        let mut plans = if initial {
            self.decompose(&target, cutoff, cache).await?
        } else {
            self.load_plans(active).await?
        };

        let assignments = self.resolve_initiatives(&target, &plans).await?;
        if initial {
            apply_initiatives(&mut plans, &assignments, None);
        }

        let actuals_changed = self.refresh_actuals(&target, &mut plans, cutoff, cache).await?;

        if cutoff >= target.final_month() {
            return self.complete(&target, plans).await;
        }

        let variance = detect_variance(&plans, cutoff, &self.config);
        let initiative_change = !initial && initiatives_changed(&plans, &assignments, Some(cutoff));

        for metric in variance.exceeding() {
            warn!(
                target_id = %target.id,
                metric_id = %metric.metric_id,
                variance = metric.variance,
                threshold = metric.threshold,
                target_variance = variance.variance,
                "Cumulative emissions above required trajectory"
            );
        }

        if !initial && !variance.exceeded && !initiative_change {
            if actuals_changed {
                self.plans
                    .commit_plan(PlanCommit {
                        metric_targets: Vec::new(),
                        allocations: plans.into_iter().flat_map(|p| p.allocations).collect(),
                        event: None,
                    })
                    .await?;
            }
            self.metrics.write().unchanged += 1;
            debug!(target_id = %target.id, actuals_changed, "Plan unchanged");
            return Ok(ReplanOutcome::Unchanged);
        }

        if initial && !variance.exceeded {
            return self
                .commit_initial(&target, plans, cutoff, trigger, reason)
                .await;
        }

        let weights = self.weights(&target, &plans, cutoff, cache).await?;
        let potential: f64 = plans
            .iter()
            .map(|p| p.remaining_potential(cutoff, self.config.trailing_months))
            .sum();
        let (mut replanned, budget) = reallocate(
            &plans,
            cutoff,
            &weights,
            potential,
            self.config.conservation_tolerance,
            target.id,
        )?;
        apply_initiatives(&mut replanned, &assignments, Some(cutoff));

        if !initial && same_targets(&plans, &replanned) {
            self.metrics.write().unchanged += 1;
            debug!(target_id = %target.id, "Reallocation produced the current plan");
            return Ok(ReplanOutcome::Unchanged);
        }

        let mut commit = PlanCommit::default();
        let mut previous_allocations = Vec::with_capacity(plans.len());
        let mut new_allocations = Vec::with_capacity(plans.len());

        for (current, candidate) in plans.into_iter().zip(replanned) {
            previous_allocations.push(AllocationSnapshot::capture(
                &current.metric_target,
                &current.allocations,
            ));

            let mut superseded = current.metric_target;
            superseded.transition(MetricTargetStatus::Reallocating)?;
            let successor = superseded.successor();
            superseded.transition(MetricTargetStatus::Superseded)?;

            let candidate = candidate.rebind(successor);
            new_allocations.push(AllocationSnapshot::capture(
                &candidate.metric_target,
                &candidate.allocations,
            ));

            commit.metric_targets.push(superseded);
            commit.allocations.extend(current.allocations);
            commit.metric_targets.push(candidate.metric_target);
            commit.allocations.extend(candidate.allocations);
        }

        let detail = describe(&variance, initiative_change, initial);
        let event = ReplanningEvent {
            id: Uuid::new_v4(),
            organization_id: target.organization_id,
            target_id: target.id,
            triggered_at: Utc::now(),
            trigger,
            reason: compose_reason(reason, &detail),
            previous_allocations,
            new_allocations,
            total_budget: budget.total_budget,
            remaining_budget: budget.remaining_budget,
            remaining_reduction: budget.remaining_reduction,
        };

        commit.event = Some(event.clone());
        self.plans.commit_plan(commit).await?;
        {
            let mut metrics = self.metrics.write();
            metrics.replans += 1;
            if initial {
                metrics.initial_decompositions += 1;
            }
        }
        self.deliver_pending(target.organization_id).await?;

        info!(
            organization_id = %target.organization_id,
            target_id = %target.id,
            total_budget = budget.total_budget,
            remaining_budget = budget.remaining_budget,
            remaining_reduction = budget.remaining_reduction,
            "Committed replanned allocations"
        );

        Ok(ReplanOutcome::Replanned(event))
    }

    /// Append outbox events to the history and acknowledge them
    ///
    /// An event already in the history is only acknowledged, so a failed
    /// acknowledgement never records it twice.
    async fn deliver_pending(&self, organization_id: Uuid) -> PlanningResult<usize> {
        let pending = self.plans.pending_events(organization_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let recorded: HashSet<Uuid> = self
            .history
            .events(organization_id)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        for event in &pending {
            if !recorded.contains(&event.id) {
                self.history.append(event.clone()).await?;
            }
            self.plans.acknowledge_event(event.id).await?;
        }
        Ok(pending.len())
    }

    /// Split a target across metrics by baseline-year emissions
    async fn decompose(
        &self,
        target: &Target,
        cutoff: YearMonth,
        cache: &RunCache,
    ) -> PlanningResult<Vec<MetricPlan>> {
        let filter = match target.scope {
            Some(scope) => MetricFilter::Scope(scope),
            None => MetricFilter::All,
        };
        let metrics: Vec<_> = self
            .catalog
            .list()
            .await?
            .into_iter()
            .filter(|m| filter.selects(m))
            .collect();

        let mut baselines = Vec::new();
        for metric in metrics {
            let report = self
                .aggregate(
                    target.organization_id,
                    metric.id,
                    YearMonth::first_of_year(target.baseline_year),
                    YearMonth::last_of_year(target.baseline_year),
                    cache,
                )
                .await?;
            let emissions = report.total_emissions();
            if emissions > 0.0 {
                let activity: f64 = report
                    .aggregates
                    .iter()
                    .filter_map(|a| a.total_value)
                    .sum();
                baselines.push((metric, emissions, activity));
            }
        }

        let total: f64 = baselines.iter().map(|(_, e, _)| e).sum();
        if baselines.is_empty() || total <= 0.0 {
            return Err(PlanningError::NoBaselineData {
                target_id: target.id,
                baseline_year: target.baseline_year,
            });
        }

        let calculator =
            TrajectoryCalculator::new().with_policy(self.config.trajectory_policy.clone());
        let mut plans = Vec::with_capacity(baselines.len());
        for (metric, emissions, activity) in baselines {
            let share = emissions / total;
            let baseline_emissions = target.baseline_kg() * share;
            let target_emissions = target.target_kg() * share;
            let split = self
                .monthly_split(target.organization_id, metric.id, cutoff, cache)
                .await?;
            let trajectory = calculator.clone().with_split(split).calculate(
                baseline_emissions,
                target.baseline_year,
                target_emissions,
                target.target_year,
                Unit::KgCo2e,
            )?;

            let metric_target = MetricTarget {
                id: Uuid::new_v4(),
                organization_id: target.organization_id,
                target_id: target.id,
                metric_id: metric.id,
                version: 1,
                supersedes: None,
                baseline_value: activity,
                value_unit: metric.unit.canonical(),
                baseline_emissions,
                target_value: activity * target_emissions / baseline_emissions,
                target_emissions,
                status: MetricTargetStatus::Active,
                created_at: Utc::now(),
            };
            let allocations = trajectory
                .monthly
                .iter()
                .map(|m| MonthlyTargetAllocation::new(metric_target.id, m.month, m.required_emissions))
                .collect();

            debug!(
                metric = %metric.code,
                share,
                baseline_emissions,
                target_emissions,
                "Decomposed target share"
            );
            plans.push(MetricPlan {
                metric_target,
                allocations,
            });
        }

        info!(
            target_id = %target.id,
            metrics = plans.len(),
            "Decomposed target into metric targets"
        );
        Ok(plans)
    }

    async fn load_plans(&self, active: Vec<MetricTarget>) -> PlanningResult<Vec<MetricPlan>> {
        let mut plans = Vec::with_capacity(active.len());
        for metric_target in active {
            let allocations = self.plans.allocations(metric_target.id).await?;
            plans.push(MetricPlan {
                metric_target,
                allocations,
            });
        }
        Ok(plans)
    }

    /// Resolve each initiative to the metric it reduces
    async fn resolve_initiatives(
        &self,
        target: &Target,
        plans: &[MetricPlan],
    ) -> PlanningResult<Vec<InitiativeAssignment>> {
        let mut assignments = Vec::new();
        for initiative in self.plans.list_initiatives(target.organization_id).await? {
            let metric_id = match initiative.metric_target_id {
                None => None,
                Some(id) => {
                    let metric_target = match plans.iter().find(|p| p.metric_target.id == id) {
                        Some(plan) => plan.metric_target.clone(),
                        None => self.plans.get_metric_target(id).await?,
                    };
                    if metric_target.target_id != target.id {
                        continue;
                    }
                    Some(metric_target.metric_id)
                }
            };
            assignments.push(InitiativeAssignment {
                metric_id,
                initiative,
            });
        }
        Ok(assignments)
    }

    /// Load actuals for every elapsed planned month; returns whether any changed
    async fn refresh_actuals(
        &self,
        target: &Target,
        plans: &mut [MetricPlan],
        cutoff: YearMonth,
        cache: &RunCache,
    ) -> PlanningResult<bool> {
        let first = target.first_planned_month();
        let last = cutoff.min(target.final_month());
        if last < first {
            return Ok(false);
        }

        let mut changed = false;
        for plan in plans.iter_mut() {
            let report = self
                .aggregate(
                    target.organization_id,
                    plan.metric_target.metric_id,
                    first,
                    last,
                    cache,
                )
                .await?;
            let observed: HashMap<YearMonth, Option<f64>> = report
                .aggregates
                .iter()
                .map(|a| (a.month, (!a.is_gap()).then_some(a.total_emissions)))
                .collect();

            for allocation in plan.allocations.iter_mut().filter(|a| a.month <= last) {
                let actual = observed.get(&allocation.month).copied().flatten();
                let differs = match (allocation.actual_emissions, actual) {
                    (Some(a), Some(b)) => (a - b).abs() > ACTUAL_EPSILON,
                    (None, None) => false,
                    _ => true,
                };
                if differs {
                    changed = true;
                    allocation.set_actual(actual);
                }
            }
        }
        Ok(changed)
    }

    /// Mark every active metric target complete once the target year has elapsed
    async fn complete(
        &self,
        target: &Target,
        plans: Vec<MetricPlan>,
    ) -> PlanningResult<ReplanOutcome> {
        let mut commit = PlanCommit::default();
        for mut plan in plans {
            plan.metric_target.transition(MetricTargetStatus::Complete)?;
            commit.metric_targets.push(plan.metric_target);
            commit.allocations.extend(plan.allocations);
        }
        self.plans.commit_plan(commit).await?;
        self.metrics.write().completed += 1;
        info!(target_id = %target.id, "Target year elapsed, plan complete");
        Ok(ReplanOutcome::Completed)
    }

    async fn commit_initial(
        &self,
        target: &Target,
        plans: Vec<MetricPlan>,
        cutoff: YearMonth,
        trigger: ReplanTrigger,
        reason: &str,
    ) -> PlanningResult<ReplanOutcome> {
        let total_budget: f64 = plans.iter().map(|p| p.total_planned()).sum();
        let consumed: f64 = plans.iter().map(|p| p.consumed(cutoff)).sum();
        let potential: f64 = plans
            .iter()
            .map(|p| p.remaining_potential(cutoff, self.config.trailing_months))
            .sum();
        let remaining_budget = total_budget - consumed;

        let mut commit = PlanCommit::default();
        let mut new_allocations = Vec::with_capacity(plans.len());
        for plan in plans {
            new_allocations.push(AllocationSnapshot::capture(
                &plan.metric_target,
                &plan.allocations,
            ));
            commit.metric_targets.push(plan.metric_target);
            commit.allocations.extend(plan.allocations);
        }

        let event = ReplanningEvent {
            id: Uuid::new_v4(),
            organization_id: target.organization_id,
            target_id: target.id,
            triggered_at: Utc::now(),
            trigger,
            reason: compose_reason(reason, "initial decomposition"),
            previous_allocations: Vec::new(),
            new_allocations,
            total_budget,
            remaining_budget,
            remaining_reduction: potential - remaining_budget,
        };

        commit.event = Some(event.clone());
        self.plans.commit_plan(commit).await?;
        {
            let mut metrics = self.metrics.write();
            metrics.replans += 1;
            metrics.initial_decompositions += 1;
        }
        self.deliver_pending(target.organization_id).await?;
        info!(
            organization_id = %target.organization_id,
            target_id = %target.id,
            total_budget,
            "Committed initial decomposition"
        );
        Ok(ReplanOutcome::Replanned(event))
    }

    /// Weight of each metric in the remaining-budget split
    async fn weights(
        &self,
        target: &Target,
        plans: &[MetricPlan],
        cutoff: YearMonth,
        cache: &RunCache,
    ) -> PlanningResult<Vec<f64>> {
        let trailing = self.config.trailing_months;
        let mut weights = Vec::with_capacity(plans.len());
        for plan in plans {
            let weight = match self.config.weighting {
                WeightingPolicy::RemainingPotential => plan.remaining_potential(cutoff, trailing),
                WeightingPolicy::BaselineShare => plan.metric_target.baseline_emissions,
                WeightingPolicy::Equal => 1.0,
                WeightingPolicy::ForecastPotential => {
                    let series = self
                        .history_series(
                            target.organization_id,
                            plan.metric_target.metric_id,
                            cutoff,
                            cache,
                        )
                        .await?;
                    let forecast = self
                        .forecast
                        .forecast(&series, plan.remaining_months(cutoff));
                    if forecast.is_modelled() {
                        forecast.total()
                    } else {
                        plan.remaining_potential(cutoff, trailing)
                    }
                }
            };
            weights.push(weight);
        }
        Ok(weights)
    }

    async fn monthly_split(
        &self,
        organization_id: Uuid,
        metric_id: Uuid,
        cutoff: YearMonth,
        cache: &RunCache,
    ) -> PlanningResult<MonthlySplit> {
        if self.config.monthly_split == SplitPolicy::Even {
            return Ok(MonthlySplit::Even);
        }
        let series = self
            .history_series(organization_id, metric_id, cutoff, cache)
            .await?;
        let forecast = self.forecast.forecast(&series, 1);
        Ok(match forecast.seasonal_profile {
            Some(profile) => MonthlySplit::from_profile(&profile, forecast.metadata.historical_mean),
            None => MonthlySplit::Even,
        })
    }

    /// Emissions history of one metric ending at `cutoff`
    async fn history_series(
        &self,
        organization_id: Uuid,
        metric_id: Uuid,
        cutoff: YearMonth,
        cache: &RunCache,
    ) -> PlanningResult<MonthlySeries> {
        let start = cutoff.add_months(-(self.config.history_months as i64 - 1));
        self.aggregate(organization_id, metric_id, start, cutoff, cache)
            .await?
            .series(SeriesQuantity::Emissions)
    }

    async fn aggregate(
        &self,
        organization_id: Uuid,
        metric_id: Uuid,
        start: YearMonth,
        end: YearMonth,
        cache: &RunCache,
    ) -> PlanningResult<AggregationReport> {
        let request = AggregationRequest::new(
            organization_id,
            MetricFilter::metric(metric_id),
            start,
            end,
            None,
        )?;
        self.aggregator.aggregate_cached(cache, &request).await
    }
}

fn same_targets(current: &[MetricPlan], candidate: &[MetricPlan]) -> bool {
    current.iter().zip(candidate).all(|(a, b)| {
        a.allocations.len() == b.allocations.len()
            && a.allocations.iter().zip(&b.allocations).all(|(x, y)| {
                x.month == y.month
                    && (x.planned_emissions - y.planned_emissions).abs() <= ACTUAL_EPSILON
                    && (x.target_emissions - y.target_emissions).abs() <= ACTUAL_EPSILON
            })
    })
}

fn describe(variance: &VarianceReport, initiative_change: bool, initial: bool) -> String {
    let mut parts = Vec::new();
    if initial {
        parts.push("initial decomposition".to_string());
    }
    for metric in variance.exceeding() {
        parts.push(format!(
            "metric {} cumulative variance {:.3} kgCO2e above threshold {:.3} through {}",
            metric.metric_id, metric.variance, metric.threshold, variance.cutoff
        ));
    }
    if initiative_change {
        parts.push("initiative reductions changed".to_string());
    }
    parts.join("; ")
}

fn compose_reason(reason: &str, detail: &str) -> String {
    if reason.trim().is_empty() {
        detail.to_string()
    } else {
        format!("{}: {}", reason.trim(), detail)
    }
}
