mod common;

use approx::assert_relative_eq;
use carbon_planning::*;

use common::{date, ym, Fixture};

fn series(start: YearMonth, values: Vec<f64>) -> MonthlySeries {
    MonthlySeries {
        series_id: "test/series".to_string(),
        start,
        values,
        unit: Unit::KgCo2e,
        missing_months: 0,
    }
}

fn engine() -> ForecastEngine {
    ForecastEngine::new(ForecastConfig::default()).unwrap()
}

/// Electricity with a Dec-Feb heating peak, a slow decline and small noise
fn electricity_kwh(i: usize, month: u32) -> f64 {
    let base = 10_000.0 - 10.0 * i as f64;
    let winter = if matches!(month, 12 | 1 | 2) { 1.35 } else { 1.0 };
    let noise = ((i * 7) % 5) as f64 * 20.0 - 40.0;
    base * winter + noise
}

#[test]
fn test_model_selection_by_history_length() {
    let engine = engine();
    let start = ym(2021, 1);

    let short = engine.forecast(&series(start, vec![100.0; 11]), 6);
    assert_eq!(short.method, ForecastMethod::InsufficientData);
    assert_eq!(short.forecasted, vec![0.0; 6]);
    assert!(!short.is_modelled());
    assert!(matches!(
        short.ensure_modelled(),
        Err(PlanningError::InsufficientData { months: 11, required: 12, .. })
    ));

    let medium = engine.forecast(&series(start, (0..24).map(|i| 100.0 + 10.0 * i as f64).collect()), 6);
    assert_eq!(medium.method, ForecastMethod::ExponentialSmoothing);
    assert!(medium.seasonal_profile.is_none());

    let long = engine.forecast(
        &series(start, (0..40).map(|i| 500.0 + 50.0 * ((i % 12) as f64)).collect()),
        6,
    );
    assert_eq!(long.method, ForecastMethod::SeasonalDecomposition);
    assert!(long.seasonal_profile.is_some());
    assert_eq!(long.metadata.training_months, 40);

    let metrics = engine.get_metrics();
    assert_eq!(metrics.forecasts_generated, 3);
    assert_eq!(metrics.insufficient_data, 1);
    assert_eq!(metrics.smoothing_models, 1);
    assert_eq!(metrics.seasonal_models, 1);
}

#[test]
fn test_smoothing_extends_linear_history() {
    let history: Vec<f64> = (0..24).map(|i| 100.0 + 10.0 * i as f64).collect();
    let result = engine().forecast(&series(ym(2022, 1), history), 3);

    assert_eq!(result.months, vec![ym(2024, 1), ym(2024, 2), ym(2024, 3)]);
    assert_relative_eq!(result.forecasted[0], 340.0, epsilon = 1e-6);
    assert_relative_eq!(result.forecasted[2], 360.0, epsilon = 1e-6);
    assert_relative_eq!(result.metadata.r_squared, 1.0, epsilon = 1e-9);
    assert_relative_eq!(result.metadata.trend_slope, 10.0, epsilon = 1e-6);
}

#[test]
fn test_december_spike_sets_peak_month() {
    // History starts in March so profile position and calendar month differ
    let start = ym(2021, 3);
    let values: Vec<f64> = (0..36)
        .map(|i| {
            if start.add_months(i).month() == 12 {
                3000.0
            } else {
                1000.0
            }
        })
        .collect();

    let result = engine().forecast(&series(start, values), 12);
    assert_eq!(result.method, ForecastMethod::SeasonalDecomposition);
    assert_eq!(result.peak_month(), Some(12));

    let december = result.value_for(ym(2024, 12)).unwrap();
    let june = result.value_for(ym(2024, 6)).unwrap();
    assert!(december > 2.0 * june);
}

#[test]
fn test_confidence_band_widens_with_horizon() {
    let history: Vec<f64> = (0..30)
        .map(|i| 800.0 + ((i * 13) % 7) as f64 * 15.0)
        .collect();
    let result = engine().forecast(&series(ym(2022, 1), history), 6);

    let band = &result.confidence;
    assert_relative_eq!(band.level, 0.95);
    for h in 0..6 {
        assert!(band.lower[h] <= result.forecasted[h]);
        assert!(band.upper[h] >= result.forecasted[h]);
    }
    let first = band.upper[0] - band.lower[0];
    let last = band.upper[5] - band.lower[5];
    assert!(last > first);
}

#[tokio::test]
async fn test_electricity_winter_peak_end_to_end() {
    let fixture = Fixture::new();

    // Step 1: three years of monthly electricity, Jan 2022 to Dec 2024
    for i in 0..36usize {
        let month = ym(2022, 1).add_months(i as i64);
        let kwh = electricity_kwh(i, month.month());
        fixture.record(fixture.electricity, month, kwh, kwh * 0.2);
    }

    // Step 2: forecast 2025 from a January 2025 run
    let service = fixture.service(date(2025, 1, 10));
    let request = ForecastRequest::emissions(
        fixture.organization_id,
        MetricFilter::Category(MetricCategory::Electricity),
    )
    .with_horizon(12);
    let result = service.get_forecast(&request).await.unwrap();

    assert_eq!(result.method, ForecastMethod::SeasonalDecomposition);
    assert_eq!(result.unit, Unit::KgCo2e);
    assert_eq!(result.months.first(), Some(&ym(2025, 1)));
    assert_eq!(result.forecasted.len(), 12);
    assert!(result.metadata.r_squared > 0.5);
    assert!(!result.metadata.extreme_trend);

    // Step 3: January and February stay well above the non-winter months
    let non_winter: Vec<f64> = result
        .months
        .iter()
        .zip(&result.forecasted)
        .filter(|(m, _)| (3..=11).contains(&m.month()))
        .map(|(_, v)| *v)
        .collect();
    let non_winter_mean = non_winter.iter().sum::<f64>() / non_winter.len() as f64;
    for winter in [ym(2025, 1), ym(2025, 2)] {
        assert!(result.value_for(winter).unwrap() >= 1.05 * non_winter_mean);
    }
    assert!(matches!(result.peak_month(), Some(12) | Some(1) | Some(2)));

    // Activity forecasts carry the canonical activity unit
    let activity = service
        .get_forecast(&request.clone().with_quantity(SeriesQuantity::Activity))
        .await
        .unwrap();
    assert_eq!(activity.unit, Unit::Kwh);
    assert_eq!(service.get_metrics().forecasts_served, 2);
}

#[tokio::test]
async fn test_regenerated_forecasts_are_persisted_and_replaced() {
    let fixture = Fixture::new();
    for i in 0..24usize {
        let month = ym(2023, 1).add_months(i as i64);
        let kwh = electricity_kwh(i, month.month());
        fixture.record(fixture.electricity, month, kwh, kwh * 0.2);
    }
    let service = fixture.service(date(2025, 1, 5));

    // Gas has no history and is skipped rather than failing the run
    let summary = service
        .regenerate_forecasts(
            fixture.organization_id,
            &[fixture.electricity, fixture.gas],
            Some(6),
        )
        .await
        .unwrap();
    assert_eq!(summary.forecasted_metrics, vec![fixture.electricity]);
    assert_eq!(summary.skipped_metrics, vec![fixture.gas]);
    assert_eq!(summary.upserted.inserted, 6);

    let persisted: Vec<Observation> = fixture
        .observations
        .all()
        .into_iter()
        .filter(Observation::is_forecast)
        .collect();
    assert_eq!(persisted.len(), 6);
    assert!(persisted
        .iter()
        .all(|o| o.data_quality == DataQuality::Calculated && o.unit == Unit::Kwh));
    match &persisted[0].metadata {
        ObservationMetadata::Forecast(metadata) => {
            assert_eq!(metadata.method, ForecastMethod::ExponentialSmoothing);
            assert_eq!(metadata.training_months, 24);
        }
        other => panic!("unexpected metadata {:?}", other),
    }

    // A second run replaces the same keys
    let again = service
        .regenerate_forecasts(fixture.organization_id, &[fixture.electricity], Some(6))
        .await
        .unwrap();
    assert_eq!(again.upserted.replaced, 6);
    assert_eq!(fixture.observations.len(), 30);

    // Persisted forecasts never count as actuals
    let report = service
        .aggregator()
        .aggregate(
            fixture.organization_id,
            &MetricFilter::metric(fixture.electricity),
            ym(2025, 1),
            ym(2025, 6),
            None,
        )
        .await
        .unwrap();
    assert!(report.aggregates.iter().all(|a| a.is_gap()));
    assert_eq!(report.forecasts_excluded, 6);
}
