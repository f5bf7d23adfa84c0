//! Common test utilities for engine integration tests
//!
//! This module provides:
//! - Deterministic data generators for sensor networks and satellite grids
//! - Stub sources that count calls, fail, or burn the run budget
//! - Pre-built scenarios with known expected outcomes

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use aerofuse_core::{BoundingBox, ManualClock, Pollutant, SatelliteObservation, SensorReading, TimeRange};
use aerofuse_engine::{
    MemorySatelliteSource, MemorySensorSource, SatelliteSource, SensorReadingSource, SourceError,
};
use chrono::Duration;

pub mod generators;
pub mod scenarios;

/// Sensor source that counts queries and optionally stalls
pub struct CountingSensorSource {
    inner: MemorySensorSource,
    calls: AtomicUsize,
    delay: StdDuration,
}

impl CountingSensorSource {
    pub fn new(readings: Vec<SensorReading>, delay: StdDuration) -> Self {
        Self {
            inner: MemorySensorSource::new(readings),
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SensorReadingSource for CountingSensorSource {
    fn query(
        &self,
        sensor_ids: Option<&[String]>,
        range: &TimeRange,
        bbox: Option<&BoundingBox>,
    ) -> Result<Vec<SensorReading>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.query(sensor_ids, range, bbox)
    }
}

/// Sensor source that is always down
pub struct FailingSensorSource;

impl SensorReadingSource for FailingSensorSource {
    fn query(
        &self,
        _sensor_ids: Option<&[String]>,
        _range: &TimeRange,
        _bbox: Option<&BoundingBox>,
    ) -> Result<Vec<SensorReading>, SourceError> {
        Err(SourceError::Unavailable("sensor API returned 503".into()))
    }
}

/// Satellite source that is always down
pub struct FailingSatelliteSource;

impl SatelliteSource for FailingSatelliteSource {
    fn query(
        &self,
        _source: &str,
        _pollutant: Pollutant,
        _range: &TimeRange,
        _bbox: &BoundingBox,
    ) -> Result<Option<SatelliteObservation>, SourceError> {
        Err(SourceError::Malformed("truncated NetCDF payload".into()))
    }
}

/// Satellite source whose queries for one pollutant cost simulated time
pub struct SlowSatelliteSource {
    inner: MemorySatelliteSource,
    clock: Arc<ManualClock>,
    slow: Pollutant,
    cost: Duration,
}

impl SlowSatelliteSource {
    pub fn new(observations: Vec<SatelliteObservation>, clock: Arc<ManualClock>, slow: Pollutant, cost: Duration) -> Self {
        Self {
            inner: MemorySatelliteSource::new(observations),
            clock,
            slow,
            cost,
        }
    }
}

impl SatelliteSource for SlowSatelliteSource {
    fn query(
        &self,
        source: &str,
        pollutant: Pollutant,
        range: &TimeRange,
        bbox: &BoundingBox,
    ) -> Result<Option<SatelliteObservation>, SourceError> {
        if pollutant == self.slow {
            self.clock.advance(self.cost);
        }
        self.inner.query(source, pollutant, range, bbox)
    }
}

/// Assert two floats agree within `tol`
pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {actual} within {tol} of {expected}"
    );
}
