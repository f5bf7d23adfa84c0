//! Fusion Run Performance Benchmark
//!
//! Measures one full run (align, cross-validate, fuse, gap-fill) over a
//! city-sized region at increasing sensor counts.
//!
//! **Goal:** a 24-hour run over 64 cells finishes well inside the default
//! 30 s budget

use std::hint::black_box;
use std::sync::Arc;

use aerofuse_core::{BoundingBox, GeoPoint, Pollutant, QualityFlag, SatelliteObservation, SensorReading, TimeRange};
use aerofuse_engine::{EngineConfig, FusionEngine, MemorySatelliteSource, MemorySensorSource};
use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const HOURS: i64 = 24;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn region() -> BoundingBox {
    BoundingBox::new(49.0, 48.5, 2.5, 2.0).unwrap()
}

fn network(sensors: usize) -> Vec<SensorReading> {
    let mut readings = Vec::with_capacity(sensors * HOURS as usize * 12);
    for s in 0..sensors {
        let location = GeoPoint::new(48.51 + 0.48 * (s % 7) as f64 / 7.0, 2.01 + 0.48 * (s / 7 % 7) as f64 / 7.0);
        for step in 0..HOURS * 12 {
            let value = 20.0 + (step % 17) as f64 * 0.8 + s as f64 * 0.1;
            readings.push(
                SensorReading::new(format!("sensor-{s:03}"), location, start() + Duration::minutes(step * 5))
                    .with_value(Pollutant::Pm25, value)
                    .with_humidity(40.0 + (step % 9) as f64 * 3.0)
                    .with_temperature(14.0),
            );
        }
    }
    readings
}

fn observations() -> Vec<SatelliteObservation> {
    (0..HOURS)
        .filter_map(|h| {
            SatelliteObservation::new(
                "cams_pm25",
                Pollutant::Pm25,
                start() + Duration::hours(h) + Duration::minutes(30),
                region(),
                0.0625,
                0.0625,
                QualityFlag::Good,
            )
            .with_uniform(22.0 + (h % 6) as f64, 2.0)
            .ok()
        })
        .collect()
}

fn bench_fusion_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion_run");
    let range = TimeRange::new(start(), start() + Duration::hours(HOURS)).unwrap();

    for sensors in [5usize, 20, 49] {
        let engine = FusionEngine::new(
            EngineConfig::default(),
            Arc::new(MemorySensorSource::new(network(sensors))),
            Arc::new(MemorySatelliteSource::new(observations())),
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("sensors", sensors), &engine, |b, engine| {
            b.iter(|| {
                let report = engine.fuse(&region(), &range).unwrap();
                black_box(report.points.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fusion_run);
criterion_main!(benches);
