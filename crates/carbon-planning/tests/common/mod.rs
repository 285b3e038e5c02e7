//! Shared fixtures for integration tests

#![allow(dead_code)]

use carbon_planning::*;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

pub fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// One organization with an electricity and a natural gas metric
pub struct Fixture {
    pub observations: InMemoryObservationStore,
    pub catalog: InMemoryMetricCatalog,
    pub targets: InMemoryTargetSource,
    pub plans: InMemoryPlanStore,
    pub history: InMemoryHistoryRecorder,
    pub organization_id: Uuid,
    pub electricity: Uuid,
    pub gas: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let catalog = InMemoryMetricCatalog::new();
        let electricity = catalog.register(MetricDefinition::new(
            "scope2_electricity",
            "Purchased electricity",
            MetricCategory::Electricity,
            EmissionScope::Scope2,
            Unit::Kwh,
        ));
        let gas = catalog.register(MetricDefinition::new(
            "scope1_natural_gas",
            "Natural gas combustion",
            MetricCategory::StationaryCombustion,
            EmissionScope::Scope1,
            Unit::Kwh,
        ));

        Self {
            observations: InMemoryObservationStore::new(),
            catalog,
            targets: InMemoryTargetSource::new(),
            plans: InMemoryPlanStore::new(),
            history: InMemoryHistoryRecorder::new(),
            organization_id: Uuid::new_v4(),
            electricity,
            gas,
        }
    }

    pub fn backends(&self) -> PlanningBackends {
        PlanningBackends::in_memory(
            &self.observations,
            &self.catalog,
            &self.targets,
            &self.plans,
            &self.history,
        )
    }

    pub fn service(&self, today: NaiveDate) -> Arc<PlanningService> {
        self.service_with(today, PlanningConfig::default())
    }

    pub fn service_with(&self, today: NaiveDate, config: PlanningConfig) -> Arc<PlanningService> {
        Arc::new(PlanningService::new(self.backends(), Arc::new(FixedClock(today)), config).unwrap())
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(
            Arc::new(self.observations.clone()),
            Arc::new(self.catalog.clone()),
            AggregatorConfig::default(),
        )
    }

    /// Store a measured monthly row (activity in kWh, emissions in kgCO2e)
    pub fn record(&self, metric_id: Uuid, month: YearMonth, kwh: f64, co2e: f64) {
        self.observations.insert_raw(vec![Observation::monthly(
            self.organization_id,
            metric_id,
            None,
            month,
            kwh,
            Unit::Kwh,
            co2e,
        )]);
    }

    /// 2023 baseline: electricity 200 kg/month, gas 100 kg/month (3600 kg total)
    pub fn record_baseline(&self) {
        for m in 1..=12 {
            self.record(self.electricity, ym(2023, m), 1000.0, 200.0);
            self.record(self.gas, ym(2023, m), 500.0, 100.0);
        }
    }

    /// Halve emissions from 2023 to 2025: 3.6 t baseline, 1.8 t target
    ///
    /// Linear phasing requires 2700 kg in 2024, split 1800 electricity and
    /// 900 gas (150 and 75 per month).
    pub fn insert_target(&self) -> Target {
        let target = Target::new(
            self.organization_id,
            None,
            2023,
            3.6,
            2025,
            1.8,
            Unit::TonnesCo2e,
        )
        .unwrap();
        self.targets.insert(target.clone());
        target
    }

    /// Record 2024 actuals for `months`, with electricity at `electricity` kg
    /// and gas on plan
    pub fn record_2024(&self, months: std::ops::RangeInclusive<u32>, electricity: f64) {
        for m in months {
            self.record(self.electricity, ym(2024, m), electricity * 5.0, electricity);
            self.record(self.gas, ym(2024, m), 375.0, 75.0);
        }
    }
}
