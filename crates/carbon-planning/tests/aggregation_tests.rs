mod common;

use approx::assert_relative_eq;
use carbon_planning::observation::fetch_all;
use carbon_planning::*;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use common::{ym, Fixture};

#[tokio::test]
async fn test_organization_total_is_sum_of_sites() {
    let fixture = Fixture::new();
    let org = fixture.organization_id;
    let lisbon = Uuid::new_v4();
    let porto = Uuid::new_v4();

    for m in 1..=6 {
        fixture.observations.insert_raw(vec![
            Observation::monthly(org, fixture.electricity, Some(lisbon), ym(2024, m), 1000.0, Unit::Kwh, 180.0),
            Observation::monthly(org, fixture.electricity, Some(porto), ym(2024, m), 2.0, Unit::Mwh, 350.0),
        ]);
    }

    let aggregator = fixture.aggregator();
    let filter = MetricFilter::metric(fixture.electricity);
    let all = aggregator
        .aggregate(org, &filter, ym(2024, 1), ym(2024, 6), None)
        .await
        .unwrap();
    let only_lisbon = aggregator
        .aggregate(org, &filter, ym(2024, 1), ym(2024, 6), Some(lisbon))
        .await
        .unwrap();
    let only_porto = aggregator
        .aggregate(org, &filter, ym(2024, 1), ym(2024, 6), Some(porto))
        .await
        .unwrap();

    assert_eq!(all.aggregates.len(), 6);
    for i in 0..6 {
        let total = &all.aggregates[i];
        assert_relative_eq!(
            total.total_emissions,
            only_lisbon.aggregates[i].total_emissions + only_porto.aggregates[i].total_emissions
        );
        // Mwh rows are normalized to kWh before summing
        assert_relative_eq!(total.total_value.unwrap(), 3000.0);
        assert_eq!(total.value_unit, Some(Unit::Kwh));
        assert_eq!(total.observation_count, 2);
    }
}

#[tokio::test]
async fn test_duplicate_resolution_is_idempotent() {
    let fixture = Fixture::new();
    let org = fixture.organization_id;

    // Step 1: legacy load with an estimated and a measured row for March
    let measured = Observation::monthly(org, fixture.gas, None, ym(2024, 3), 400.0, Unit::Kwh, 80.0);
    let mut estimated = measured.clone().with_quality(DataQuality::Estimated);
    estimated.id = Uuid::new_v4();
    estimated.co2e_emissions = 95.0;
    let mut stale = measured.clone().with_verified_at(Utc::now() - Duration::days(30));
    stale.id = Uuid::new_v4();
    stale.co2e_emissions = 70.0;
    let fresh = measured.with_verified_at(Utc::now());
    fixture.observations.insert_raw(vec![estimated, stale, fresh]);

    let aggregator = fixture.aggregator();
    let filter = MetricFilter::metric(fixture.gas);

    // Step 2: aggregation keeps the verified measured row
    let before = aggregator
        .aggregate(org, &filter, ym(2024, 3), ym(2024, 3), None)
        .await
        .unwrap();
    assert_eq!(before.duplicates_discarded, 2);
    assert_relative_eq!(before.aggregates[0].total_emissions, 80.0);

    // Step 3: purging drops the losers and leaves the total unchanged
    let removed = aggregator
        .purge_duplicates(org, ym(2024, 1), ym(2024, 12))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(fixture.observations.len(), 1);

    let after = aggregator
        .aggregate(org, &filter, ym(2024, 3), ym(2024, 3), None)
        .await
        .unwrap();
    assert_eq!(after.duplicates_discarded, 0);
    assert_relative_eq!(after.aggregates[0].total_emissions, 80.0);

    // Step 4: a second purge is a no-op
    let again = aggregator
        .purge_duplicates(org, ym(2024, 1), ym(2024, 12))
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_gap_months_are_explicit() {
    let fixture = Fixture::new();
    let org = fixture.organization_id;
    for m in [1, 2, 5, 6] {
        fixture.record(fixture.electricity, ym(2024, m), 1000.0, 200.0);
    }

    let report = fixture
        .aggregator()
        .aggregate(org, &MetricFilter::metric(fixture.electricity), ym(2023, 11), ym(2024, 8), None)
        .await
        .unwrap();
    assert_eq!(report.aggregates.len(), 10);
    let gaps: Vec<YearMonth> = report
        .aggregates
        .iter()
        .filter(|a| a.is_gap())
        .map(|a| a.month)
        .collect();
    assert_eq!(gaps, vec![ym(2023, 11), ym(2023, 12), ym(2024, 3), ym(2024, 4), ym(2024, 7), ym(2024, 8)]);

    // Leading and trailing gaps are trimmed; interior gaps are counted
    let series = report.series(SeriesQuantity::Emissions).unwrap();
    assert_eq!(series.start, ym(2024, 1));
    assert_eq!(series.values, vec![200.0, 200.0, 0.0, 0.0, 200.0, 200.0]);
    assert_eq!(series.missing_months, 2);
    assert_eq!(series.unit, Unit::KgCo2e);
}

#[tokio::test]
async fn test_incompatible_units_fail_aggregation() {
    let fixture = Fixture::new();
    let org = fixture.organization_id;
    fixture.observations.insert_raw(vec![Observation::monthly(
        org,
        fixture.electricity,
        None,
        ym(2024, 1),
        12.0,
        Unit::CubicMeters,
        3.0,
    )]);

    let result = fixture
        .aggregator()
        .aggregate(org, &MetricFilter::metric(fixture.electricity), ym(2024, 1), ym(2024, 1), None)
        .await;
    assert!(matches!(result, Err(PlanningError::UnitMismatch { .. })));
}

#[tokio::test]
async fn test_persisted_forecasts_are_not_actuals() {
    let fixture = Fixture::new();
    let org = fixture.organization_id;
    fixture.record(fixture.electricity, ym(2024, 1), 1000.0, 200.0);

    let metadata = ForecastMetadata {
        method: ForecastMethod::ExponentialSmoothing,
        r_squared: 0.7,
        trend_slope: -1.0,
        seasonal_strength: 0.0,
        training_months: 24,
        historical_mean: 200.0,
        historical_std: 10.0,
        missing_months: 0,
        extreme_trend: false,
        variance_adjusted: false,
        generated_at: Utc::now(),
    };
    fixture.observations.insert_raw(vec![Observation::monthly(
        org,
        fixture.electricity,
        None,
        ym(2024, 2),
        950.0,
        Unit::Kwh,
        190.0,
    )
    .with_quality(DataQuality::Calculated)
    .with_metadata(ObservationMetadata::Forecast(metadata))]);

    let report = fixture
        .aggregator()
        .aggregate(org, &MetricFilter::metric(fixture.electricity), ym(2024, 1), ym(2024, 2), None)
        .await
        .unwrap();
    assert_eq!(report.rows_fetched, 2);
    assert_eq!(report.forecasts_excluded, 1);
    assert!(report.aggregates[1].is_gap());
}

#[tokio::test]
async fn test_scope_filter_selects_metrics() {
    let fixture = Fixture::new();
    let org = fixture.organization_id;
    fixture.record_baseline();

    let aggregator = fixture.aggregator();
    let scope1 = aggregator
        .aggregate(org, &MetricFilter::Scope(EmissionScope::Scope1), ym(2023, 1), ym(2023, 12), None)
        .await
        .unwrap();
    let all = aggregator
        .aggregate(org, &MetricFilter::All, ym(2023, 1), ym(2023, 12), None)
        .await
        .unwrap();

    assert_relative_eq!(scope1.total_emissions(), 1200.0);
    assert_relative_eq!(all.total_emissions(), 3600.0);
    assert_eq!(all.aggregates[0].scope, None);
    assert_eq!(scope1.aggregates[0].scope, Some(EmissionScope::Scope1));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_exhaustive_pagination_matches_count(
        rows in 0usize..150,
        page_size in 1usize..40,
        backend_cap in 1usize..25,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryObservationStore::new().with_max_page_size(backend_cap);
            let org = Uuid::new_v4();
            let metric = Uuid::new_v4();
            store.insert_raw((0..rows).map(|i| {
                Observation::monthly(
                    org,
                    metric,
                    Some(Uuid::new_v4()),
                    ym(2020, 1).add_months((i % 60) as i64),
                    i as f64,
                    Unit::Kwh,
                    1.0,
                )
            }));

            let query = ObservationQuery::new(org, ym(2020, 1).first_day(), ym(2024, 12).last_day()).unwrap();
            let store: Arc<dyn ObservationStore> = Arc::new(store);
            let fetched = fetch_all(store.as_ref(), &query, page_size).await.unwrap();
            let counted = store.count(&query).await.unwrap();

            prop_assert_eq!(fetched.len(), counted);
            prop_assert_eq!(counted, rows);
            Ok(())
        })?;
    }
}
