//! Planning service implementation

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metrics::PlanningMetrics;
use super::types::{
    ForecastRequest, MetricTrajectory, MonthlyProgress, OrganizationRun, RegenerationSummary,
    TargetRun, TargetTrajectoryReport,
};
use crate::aggregator::{AggregationRequest, Aggregator, MetricFilter, SeriesQuantity};
use crate::backends::PlanningBackends;
use crate::cache::RunCache;
use crate::clock::Clock;
use crate::config::PlanningConfig;
use crate::error::{PlanningError, PlanningResult};
use crate::forecast::{ForecastEngine, ForecastResult};
use crate::observation::{DataQuality, Observation, ObservationMetadata};
use crate::period::YearMonth;
use crate::replanning::{
    InitiativeStatus, MetricTargetStatus, ReplanOutcome, ReplanTrigger, ReplanningEngine,
    ReplanningEvent,
};
use crate::trajectory::TrajectoryCalculator;
use crate::units::Unit;

/// Entry point for forecasting and replanning
pub struct PlanningService {
    backends: PlanningBackends,
    aggregator: Arc<Aggregator>,
    forecast: Arc<ForecastEngine>,
    replanning: ReplanningEngine,
    clock: Arc<dyn Clock>,
    config: Arc<PlanningConfig>,
    metrics: Arc<RwLock<PlanningMetrics>>,
}

impl PlanningService {
    /// Build the engines over `backends` after validating `config`
    pub fn new(
        backends: PlanningBackends,
        clock: Arc<dyn Clock>,
        config: PlanningConfig,
    ) -> PlanningResult<Self> {
        config.validate()?;

        let aggregator = Arc::new(Aggregator::new(
            backends.observations.clone(),
            backends.catalog.clone(),
            config.aggregator.clone(),
        ));
        let forecast = Arc::new(ForecastEngine::new(config.forecast.clone())?);
        let replanning = ReplanningEngine::new(
            &backends,
            aggregator.clone(),
            forecast.clone(),
            clock.clone(),
            config.replanning.clone(),
        )?;

        info!(
            weighting = ?config.replanning.weighting,
            history_months = config.replanning.history_months,
            "Planning service initialized"
        );

        Ok(Self {
            backends,
            aggregator,
            forecast,
            replanning,
            clock,
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(PlanningMetrics::default())),
        })
    }

    /// Aggregator shared by the engines
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Forecast engine
    pub fn forecast_engine(&self) -> &ForecastEngine {
        &self.forecast
    }

    /// Replanning engine
    pub fn replanning_engine(&self) -> &ReplanningEngine {
        &self.replanning
    }

    /// Service configuration
    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    /// Get service metrics
    pub fn get_metrics(&self) -> PlanningMetrics {
        self.metrics.read().clone()
    }

    /// Fresh cache for one organization run
    pub fn run_cache(&self, organization_id: Uuid) -> RunCache {
        RunCache::from_config(organization_id, &self.config.cache)
    }

    /// Forecast a series from history ending at the last complete month
    pub async fn get_forecast(&self, request: &ForecastRequest) -> PlanningResult<ForecastResult> {
        let (start, end) = self.history_window();
        let report = self
            .aggregator
            .aggregate(
                request.organization_id,
                &request.filter,
                start,
                end,
                request.site_id,
            )
            .await?;
        let series = report.series(request.quantity)?;
        let horizon = request
            .horizon_months
            .unwrap_or(self.config.forecast.default_horizon);

        let result = self.forecast.forecast(&series, horizon);
        self.metrics.write().forecasts_served += 1;
        debug!(
            series_id = %result.series_id,
            method = %result.method,
            horizon,
            "Served forecast"
        );
        Ok(result)
    }

    /// Required path of a target next to the current and original plans
    pub async fn get_trajectory(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> PlanningResult<TargetTrajectoryReport> {
        let target = self
            .backends
            .targets
            .get_target(organization_id, target_id)
            .await?;
        let trajectory = TrajectoryCalculator::new()
            .with_policy(self.config.replanning.trajectory_policy.clone())
            .calculate_for(&target)?;
        let cutoff = self.clock.last_complete_month();

        let versions = self
            .backends
            .plans
            .list_metric_targets(organization_id, target_id)
            .await?;

        let mut metrics = Vec::new();
        let mut cumulative_actual = 0.0;
        for current in versions.iter().filter(|mt| {
            matches!(
                mt.status,
                MetricTargetStatus::Active | MetricTargetStatus::Complete
            )
        }) {
            let allocations = self.backends.plans.allocations(current.id).await?;
            let original = versions
                .iter()
                .find(|v| v.metric_id == current.metric_id && v.version == 1 && v.id != current.id);
            let original_targets: HashMap<YearMonth, f64> = match original {
                Some(v) => self
                    .backends
                    .plans
                    .allocations(v.id)
                    .await?
                    .into_iter()
                    .map(|a| (a.month, a.target_emissions))
                    .collect(),
                None => allocations
                    .iter()
                    .map(|a| (a.month, a.target_emissions))
                    .collect(),
            };

            cumulative_actual += allocations
                .iter()
                .filter(|a| a.month <= cutoff)
                .filter_map(|a| a.actual_emissions)
                .sum::<f64>();

            metrics.push(MetricTrajectory {
                metric_id: current.metric_id,
                metric_target_id: current.id,
                version: current.version,
                status: current.status,
                months: allocations
                    .iter()
                    .map(|a| MonthlyProgress {
                        month: a.month,
                        original_target: original_targets.get(&a.month).copied(),
                        planned_emissions: a.planned_emissions,
                        target_emissions: a.target_emissions,
                        actual_emissions: a.actual_emissions,
                        variance: a.variance,
                    })
                    .collect(),
            });
        }
        metrics.sort_by_key(|m| m.metric_id);

        self.metrics.write().trajectories_served += 1;
        Ok(TargetTrajectoryReport {
            organization_id,
            target_id,
            unit: Unit::KgCo2e,
            cutoff,
            cumulative_required: trajectory.cumulative_through(cutoff),
            required: trajectory.monthly,
            metrics,
            cumulative_actual,
        })
    }

    /// Replan one target; fails with `ConcurrentReplan` if the organization is busy
    pub async fn trigger_replan(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
        trigger: ReplanTrigger,
        reason: &str,
    ) -> PlanningResult<ReplanOutcome> {
        let cache = self.run_cache(organization_id);
        self.replanning
            .trigger_replan(organization_id, target_id, trigger, reason, &cache)
            .await
    }

    /// Replanning events recorded for a target, oldest first
    pub async fn replanning_history(
        &self,
        organization_id: Uuid,
        target_id: Uuid,
    ) -> PlanningResult<Vec<ReplanningEvent>> {
        self.backends
            .history
            .events_for_target(organization_id, target_id)
            .await
    }

    /// Forecast each metric and persist the values as calculated observations
    ///
    /// Runs under the organization lock. Metrics without enough history are
    /// reported as skipped rather than failing the run.
    pub async fn regenerate_forecasts(
        &self,
        organization_id: Uuid,
        metric_ids: &[Uuid],
        horizon: Option<usize>,
    ) -> PlanningResult<RegenerationSummary> {
        let _guard = self.replanning.locks().try_lock(organization_id)?;
        let cache = self.run_cache(organization_id);
        let (start, end) = self.history_window();
        let horizon = horizon.unwrap_or(self.config.forecast.default_horizon);

        let metric_ids: BTreeSet<Uuid> = metric_ids.iter().copied().collect();
        let mut summary = RegenerationSummary::default();
        let mut rows = Vec::new();

        for metric_id in metric_ids {
            let metric = self.backends.catalog.lookup(metric_id).await?;
            let request = AggregationRequest::new(
                organization_id,
                MetricFilter::metric(metric_id),
                start,
                end,
                None,
            )?;
            let report = self.aggregator.aggregate_cached(&cache, &request).await?;

            let emissions = self
                .forecast
                .forecast(&report.series(SeriesQuantity::Emissions)?, horizon);
            if !emissions.is_modelled() {
                warn!(
                    metric = %metric.code,
                    training_months = emissions.metadata.training_months,
                    "Skipping forecast regeneration, insufficient history"
                );
                summary.skipped_metrics.push(metric_id);
                continue;
            }

            let activity = report
                .series(SeriesQuantity::Activity)
                .ok()
                .map(|series| (series.unit, self.forecast.forecast(&series, horizon)))
                .filter(|(_, forecast)| forecast.is_modelled());
            let value_unit = activity
                .as_ref()
                .map(|(unit, _)| *unit)
                .unwrap_or_else(|| metric.unit.canonical());
            let historical_activity: f64 = report
                .aggregates
                .iter()
                .filter_map(|a| a.total_value)
                .sum();
            let historical_emissions = report.total_emissions();
            let intensity = if historical_emissions > 0.0 {
                historical_activity / historical_emissions
            } else {
                0.0
            };

            for (month, co2e) in emissions.months.iter().zip(&emissions.forecasted) {
                let value = activity
                    .as_ref()
                    .and_then(|(_, forecast)| forecast.value_for(*month))
                    .unwrap_or(co2e * intensity)
                    .max(0.0);
                rows.push(
                    Observation::monthly(
                        organization_id,
                        metric_id,
                        None,
                        *month,
                        value,
                        value_unit,
                        *co2e,
                    )
                    .with_quality(DataQuality::Calculated)
                    .with_metadata(ObservationMetadata::Forecast(emissions.metadata.clone())),
                );
            }
            summary.forecasted_metrics.push(metric_id);
        }

        if !rows.is_empty() {
            summary.upserted = self.backends.observations.upsert(rows).await?;
        }

        {
            let mut metrics = self.metrics.write();
            metrics.forecasts_persisted +=
                (summary.upserted.inserted + summary.upserted.replaced) as u64;
            metrics.forecasts_skipped += summary.skipped_metrics.len() as u64;
        }
        info!(
            organization_id = %organization_id,
            forecasted = summary.forecasted_metrics.len(),
            skipped = summary.skipped_metrics.len(),
            inserted = summary.upserted.inserted,
            replaced = summary.upserted.replaced,
            "Regenerated forecasts"
        );
        Ok(summary)
    }

    /// Change an initiative's status and replan every target it affects
    ///
    /// An initiative bound to a metric target replans that target; a
    /// cross-cutting one replans every target that already has a plan.
    pub async fn update_initiative_status(
        &self,
        organization_id: Uuid,
        initiative_id: Uuid,
        status: InitiativeStatus,
    ) -> PlanningResult<Vec<ReplanOutcome>> {
        let guard = self.replanning.locks().try_lock(organization_id)?;

        let mut initiative = self.backends.plans.get_initiative(initiative_id).await?;
        if initiative.organization_id != organization_id {
            return Err(PlanningError::InitiativeNotFound { initiative_id });
        }
        if initiative.status == status {
            debug!(initiative_id = %initiative_id, status = %status, "Initiative status unchanged");
            return Ok(Vec::new());
        }

        let previous = initiative.status;
        initiative.status = status;
        self.backends
            .plans
            .upsert_initiative(initiative.clone())
            .await?;
        info!(
            initiative_id = %initiative_id,
            name = %initiative.name,
            from = %previous,
            to = %status,
            "Initiative status changed"
        );

        let target_ids = match initiative.metric_target_id {
            Some(metric_target_id) => vec![
                self.backends
                    .plans
                    .get_metric_target(metric_target_id)
                    .await?
                    .target_id,
            ],
            None => {
                let mut ids = Vec::new();
                for target in self.backends.targets.list_targets(organization_id).await? {
                    let planned = self
                        .backends
                        .plans
                        .list_metric_targets(organization_id, target.id)
                        .await?;
                    if !planned.is_empty() {
                        ids.push(target.id);
                    }
                }
                ids
            }
        };

        let cache = self.run_cache(organization_id);
        let reason = format!(
            "initiative '{}' {} -> {}",
            initiative.name, previous, status
        );
        let mut outcomes = Vec::with_capacity(target_ids.len());
        for target_id in target_ids {
            let outcome = self
                .replanning
                .replan_locked(
                    &guard,
                    organization_id,
                    target_id,
                    ReplanTrigger::InitiativeStatusChanged { initiative_id },
                    &reason,
                    &cache,
                )
                .await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Delete duplicate observations in a window, keeping the policy winner
    pub async fn purge_duplicates(
        &self,
        organization_id: Uuid,
        start: YearMonth,
        end: YearMonth,
    ) -> PlanningResult<usize> {
        let _guard = self.replanning.locks().try_lock(organization_id)?;
        let removed = self
            .aggregator
            .purge_duplicates(organization_id, start, end)
            .await?;
        self.metrics.write().duplicates_purged += removed as u64;
        Ok(removed)
    }

    /// Replan every target of each organization, organizations in parallel
    pub async fn run_scheduled(self: Arc<Self>, organizations: Vec<Uuid>) -> Vec<OrganizationRun> {
        let mut jobs = JoinSet::new();
        for organization_id in organizations.into_iter().collect::<BTreeSet<_>>() {
            let service = Arc::clone(&self);
            jobs.spawn(async move {
                let targets = service.run_organization(organization_id).await;
                OrganizationRun {
                    organization_id,
                    targets,
                }
            });
        }

        let mut runs = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(run) => runs.push(run),
                Err(e) => error!(error = %e, "Scheduled organization job aborted"),
            }
        }
        runs.sort_by_key(|run| run.organization_id);

        info!(
            organizations = runs.len(),
            replanned = runs.iter().map(OrganizationRun::replanned).sum::<usize>(),
            "Scheduled replanning finished"
        );
        runs
    }

    /// One scheduled job: every target of the organization under one lock
    async fn run_organization(&self, organization_id: Uuid) -> PlanningResult<Vec<TargetRun>> {
        self.metrics.write().scheduled_runs += 1;

        let guard = match self.replanning.locks().try_lock(organization_id) {
            Ok(guard) => guard,
            Err(e) => {
                self.metrics.write().failed_runs += 1;
                return Err(e);
            }
        };
        let targets = match self.backends.targets.list_targets(organization_id).await {
            Ok(targets) => targets,
            Err(e) => {
                self.metrics.write().failed_runs += 1;
                return Err(e);
            }
        };

        let cache = self.run_cache(organization_id);
        let mut runs = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self
                .replanning
                .replan_locked(
                    &guard,
                    organization_id,
                    target.id,
                    ReplanTrigger::Scheduled,
                    "scheduled run",
                    &cache,
                )
                .await;
            if let Err(e) = &outcome {
                warn!(
                    organization_id = %organization_id,
                    target_id = %target.id,
                    error = %e,
                    "Scheduled replanning failed for target"
                );
            }
            runs.push(TargetRun {
                target_id: target.id,
                outcome,
            });
        }
        Ok(runs)
    }

    /// History window ending at the last complete month
    fn history_window(&self) -> (YearMonth, YearMonth) {
        let end = self.clock.last_complete_month();
        let start = end.add_months(-(self.config.replanning.history_months as i64 - 1));
        (start, end)
    }
}
