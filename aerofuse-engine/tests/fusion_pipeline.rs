//! Integration tests for the fusion run pipeline
//!
//! Tests the full path from upstream sources to a report:
//! - Sensor/satellite blending and confidence regimes
//! - Cross-validation verdicts and anomaly signalling
//! - Degradation when a source is down
//! - Composite AQI and run-completion events

#![cfg(test)]

mod common;

use std::sync::Arc;

use aerofuse_core::events::MemorySink;
use aerofuse_core::{AqiCategory, EngineEvent, ManualClock, Pollutant, QualityFlag, SatelliteObservation};
use aerofuse_engine::{EngineConfig, FusionEngine, MemorySatelliteSource, MemorySensorSource};
use chrono::Duration;
use proptest::prelude::*;

use common::{
    assert_close,
    scenarios::{base_time, constant_pair, hours, region, Harness, CELL_SIZE, REGION_CELLS},
    FailingSatelliteSource, FailingSensorSource,
};

#[test]
fn test_agreeing_sensor_blends_with_satellite() {
    let (readings, observations) = constant_pair(40.0, 34.0, 3);
    let h = Harness::new(EngineConfig::default(), readings, observations, base_time() + Duration::hours(3));

    let report = h.engine.fuse(&region(), &hours(0, 3)).unwrap();
    assert!(report.status.is_complete());
    assert_eq!(report.points.len(), 3 * REGION_CELLS);

    let sensor_points: Vec<_> = report.points.iter().filter(|p| p.sensor_value.is_some()).collect();
    assert_eq!(sensor_points.len(), 3);
    for point in sensor_points {
        assert_eq!(point.satellite_value, Some(34.0));
        assert!(point.fused_value > 34.0 && point.fused_value < 40.0);
        // 0.225 sensor weight against 0.35 satellite weight
        assert_close(point.fused_value, 36.348, 0.01);
        assert!(point.confidence.as_float() > 0.75);
        assert_eq!(point.category, Some(AqiCategory::UnhealthySensitive));
        assert_eq!(point.sources, vec!["s1".to_string(), "cams_pm25".to_string()]);
    }

    // Gap-filled cells stay below any blended point
    for point in report.points.iter().filter(|p| p.sensor_value.is_none()) {
        assert_eq!(point.fused_value, 34.0);
        assert_close(point.confidence.as_float(), 0.5, 1e-12);
    }

    // Chronological order
    assert!(report.points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let validation = h.engine.validation_report(&hours(0, 3));
    assert_eq!(validation.len(), 1);
    assert!(validation[0].is_valid);
    assert_eq!(validation[0].sample_count, 3);
    assert_close(validation[0].mean_deviation, 6.0 / 34.0, 1e-9);
    assert!(h.sink.anomalies().is_empty());
    assert!(h.engine.sensor_healthy("s1", Pollutant::Pm25));
}

#[test]
fn test_drifting_sensor_is_flagged_once() {
    let (readings, observations) = constant_pair(80.0, 34.0, 3);
    let h = Harness::new(EngineConfig::default(), readings, observations, base_time() + Duration::hours(3));

    let report = h.engine.fuse(&region(), &hours(0, 3)).unwrap();
    let anomalies = h.sink.anomalies();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].sensor_id, "s1");
    assert_close(anomalies[0].deviation_percent, 46.0 / 34.0 * 100.0, 1e-6);
    assert_eq!(anomalies[0].anomaly_rate, 1.0);
    assert!(!h.engine.sensor_healthy("s1", Pollutant::Pm25));

    // Penalised sensor pulls the estimate only slightly off the satellite
    for point in report.points.iter().filter(|p| p.sensor_value.is_some()) {
        assert_close(point.fused_value, 40.4, 0.05);
        assert!(point.fused_value < (80.0 + 34.0) / 2.0);
    }

    let validation = h.engine.validation_report(&hours(0, 3));
    assert!(!validation[0].is_valid);
    assert!(validation[0].is_anomalous());

    // Still drifting on the next run, but the transition was already signalled
    h.engine.fuse(&region(), &hours(0, 3)).unwrap();
    assert_eq!(h.sink.anomalies().len(), 1);
}

#[test]
fn test_single_drifting_window_raises_anomaly() {
    let (readings, observations) = constant_pair(80.0, 34.0, 1);
    let h = Harness::new(EngineConfig::default(), readings, observations, base_time() + Duration::hours(1));

    let report = h.engine.fuse(&region(), &hours(0, 1)).unwrap();
    let anomalies = h.sink.anomalies();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].sensor_id, "s1");
    assert_close(anomalies[0].deviation_percent, 46.0 / 34.0 * 100.0, 1e-6);
    assert!(!h.engine.sensor_healthy("s1", Pollutant::Pm25));

    let validation = h.engine.validation_report(&hours(0, 1));
    assert_eq!(validation.len(), 1);
    assert_eq!(validation[0].sample_count, 1);
    assert!(!validation[0].is_valid);
    assert!(validation[0].is_anomalous());

    // Same down-weighting as a drifting sensor over a longer horizon
    let point = report.points.iter().find(|p| p.sensor_value.is_some()).unwrap();
    assert_close(point.fused_value, 40.4, 0.05);
}

#[test]
fn test_empty_sources_yield_empty_complete_report() {
    let h = Harness::new(EngineConfig::default(), Vec::new(), Vec::new(), base_time());

    let report = h.engine.fuse(&region(), &hours(0, 6)).unwrap();
    assert!(report.points.is_empty());
    assert!(report.status.is_complete());
    assert_eq!(report.summary_confidence, 0.0);
}

#[test]
fn test_sensor_outage_falls_back_to_satellite() {
    let (_, observations) = constant_pair(40.0, 34.0, 2);
    let engine = FusionEngine::new(
        EngineConfig::default(),
        Arc::new(FailingSensorSource),
        Arc::new(MemorySatelliteSource::new(observations)),
    )
    .unwrap();

    let report = engine.fuse(&region(), &hours(0, 2)).unwrap();
    assert!(report.status.is_complete());
    assert_eq!(report.points.len(), 2 * REGION_CELLS);
    for point in &report.points {
        assert_eq!(point.sensor_value, None);
        assert!(point.confidence.as_float() <= 0.5);
    }
}

#[test]
fn test_satellite_outage_falls_back_to_sensors() {
    let (readings, _) = constant_pair(40.0, 34.0, 2);
    let engine = FusionEngine::new(
        EngineConfig::default(),
        Arc::new(MemorySensorSource::new(readings)),
        Arc::new(FailingSatelliteSource),
    )
    .unwrap();

    let report = engine.fuse(&region(), &hours(0, 2)).unwrap();
    assert!(report.status.is_complete());
    assert_eq!(report.points.len(), 2);
    for point in &report.points {
        assert_eq!(point.satellite_value, None);
        assert_eq!(point.cell, None);
        assert_close(point.fused_value, 40.0, 1e-9);
        assert!(point.confidence.as_float() <= 0.75);
    }
    assert!(engine.validation_report(&hours(0, 2))[0].correlation.is_none());
}

#[test]
fn test_both_sources_down_produce_no_points() {
    let engine = FusionEngine::new(
        EngineConfig::default(),
        Arc::new(FailingSensorSource),
        Arc::new(FailingSatelliteSource),
    )
    .unwrap();

    let report = engine.fuse(&region(), &hours(0, 2)).unwrap();
    assert!(report.points.is_empty());
    assert!(report.status.is_complete());
}

#[test]
fn test_invalid_retrieval_is_ignored() {
    let invalid = SatelliteObservation::new(
        "cams_pm25",
        Pollutant::Pm25,
        base_time() + Duration::minutes(30),
        region(),
        CELL_SIZE,
        CELL_SIZE,
        QualityFlag::Invalid,
    )
    .with_uniform(34.0, 1.0)
    .unwrap();
    let h = Harness::new(EngineConfig::default(), Vec::new(), vec![invalid], base_time());

    let report = h.engine.fuse(&region(), &hours(0, 1)).unwrap();
    assert!(report.points.is_empty());
}

#[test]
fn test_sparse_windows_lower_confidence() {
    // Six readings per hour
    let (readings, observations) = constant_pair(40.0, 34.0, 3);

    let dense = Harness::new(EngineConfig::default(), readings.clone(), observations.clone(), base_time());
    let mut config = EngineConfig::default();
    config.aligner.min_readings = 12;
    let sparse = Harness::new(config, readings, observations, base_time());

    let confidence = |h: &Harness| {
        h.engine
            .fuse(&region(), &hours(0, 3))
            .unwrap()
            .points
            .iter()
            .find(|p| p.sensor_value.is_some())
            .map(|p| p.confidence.as_float())
            .unwrap()
    };
    assert!(confidence(&sparse) < confidence(&dense));
}

#[test]
fn test_composite_aqi_reports_dominant_pollutant() {
    let pm25 = SatelliteObservation::new(
        "cams_pm25",
        Pollutant::Pm25,
        base_time() + Duration::minutes(30),
        region(),
        CELL_SIZE,
        CELL_SIZE,
        QualityFlag::Good,
    )
    .with_uniform(20.0, 1.0)
    .unwrap();
    let no2 = SatelliteObservation::new(
        "tropomi_no2",
        Pollutant::No2,
        base_time() + Duration::minutes(40),
        region(),
        CELL_SIZE,
        CELL_SIZE,
        QualityFlag::Good,
    )
    .with_uniform(150.0, 5.0)
    .unwrap();
    let config = EngineConfig::default()
        .with_pollutants(vec![Pollutant::Pm25, Pollutant::No2])
        .with_satellite_sources(["cams_pm25", "tropomi_no2"]);
    let h = Harness::new(config, Vec::new(), vec![pm25, no2], base_time());

    let report = h.engine.fuse(&region(), &hours(0, 1)).unwrap();
    assert_eq!(report.points_for(Pollutant::Pm25).count(), REGION_CELLS);
    assert_eq!(report.points_for(Pollutant::No2).count(), REGION_CELLS);

    let composite = report.composite_aqi();
    assert_eq!(composite.len(), REGION_CELLS);
    for site in composite {
        assert_eq!(site.dominant, Pollutant::No2);
        assert!(site.index > 100);
        assert_eq!(site.per_pollutant.len(), 2);
        assert!(site.per_pollutant[&Pollutant::Pm25] < site.index);
    }
}

#[test]
fn test_completion_event_summarises_run() {
    let (readings, observations) = constant_pair(40.0, 34.0, 2);
    let now = base_time() + Duration::hours(2);
    let h = Harness::new(EngineConfig::default(), readings, observations, now);

    let report = h.engine.fuse(&region(), &hours(0, 2)).unwrap();
    let events = h.sink.events();
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::FusionCompleted {
                point_count,
                average_confidence,
                sources_used,
                complete,
                completed_at,
                ..
            } => Some((*point_count, *average_confidence, sources_used.clone(), *complete, *completed_at)),
            _ => None,
        })
        .collect();

    assert_eq!(completed.len(), 1);
    let (count, confidence, sources, complete, at) = &completed[0];
    assert_eq!(*count, report.points.len());
    assert_close(*confidence, report.summary_confidence, 1e-12);
    assert_eq!(sources, &vec!["cams_pm25".to_string(), "s1".to_string()]);
    assert!(*complete);
    assert_eq!(*at, now);
}

#[test]
fn test_unsnapped_range_widens_to_windows() {
    let (readings, observations) = constant_pair(40.0, 34.0, 3);
    let h = Harness::new(EngineConfig::default(), readings, observations, base_time());

    let ragged = aerofuse_core::TimeRange::new(
        base_time() + Duration::minutes(20),
        base_time() + Duration::hours(2) + Duration::minutes(5),
    )
    .unwrap();
    let report = h.engine.fuse(&region(), &ragged).unwrap();
    assert_eq!(report.span, hours(0, 3));
    assert_eq!(report.points.len(), 3 * REGION_CELLS);
}

#[test]
fn test_engine_is_shareable_across_threads() {
    let (readings, observations) = constant_pair(40.0, 34.0, 2);
    let engine = Arc::new(
        FusionEngine::new(
            EngineConfig::default(),
            Arc::new(MemorySensorSource::new(readings)),
            Arc::new(MemorySatelliteSource::new(observations)),
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(base_time())))
        .with_sink(Arc::new(MemorySink::new())),
    );

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.fuse(&region(), &hours(i % 2, 2)).unwrap().points.len())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap() > 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_fused_values_stay_between_sources(sensor in 1.0f64..400.0, satellite in 1.0f64..400.0) {
        let (readings, observations) = constant_pair(sensor, satellite, 2);
        let h = Harness::new(EngineConfig::default(), readings, observations, base_time());

        let report = h.engine.fuse(&region(), &hours(0, 2)).unwrap();
        prop_assert_eq!(report.points.len(), 2 * REGION_CELLS);
        let (lo, hi) = (sensor.min(satellite) - 1e-9, sensor.max(satellite) + 1e-9);
        for point in &report.points {
            prop_assert!(point.fused_value >= lo && point.fused_value <= hi);
            let confidence = point.confidence.as_float();
            prop_assert!((0.0..=1.0).contains(&confidence));
        }
    }
}
