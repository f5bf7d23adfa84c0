//! Pre-built scenarios with known expected outcomes
//!
//! The test region is a 2×2 grid of quarter-degree cells:
//! ```text
//!  49.00 ┌────────┬────────┐
//!        │ (0,0)  │ (0,1)  │
//!  48.75 ├────────┼────────┤
//!        │ (1,0)  │ (1,1)  │
//!  48.50 └────────┴────────┘
//!       2.00     2.25     2.50
//! ```
//! Edges are binary-exact so the grid shape never depends on rounding.

use std::sync::Arc;

use aerofuse_core::events::MemorySink;
use aerofuse_core::{BoundingBox, GeoPoint, ManualClock, Pollutant, SatelliteObservation, SensorReading, TimeRange};
use aerofuse_engine::{EngineConfig, FusionEngine, MemorySatelliteSource, MemorySensorSource};
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::generators::{hourly_observations, sensor_series, SensorModel, TestRng};

/// Grid cell size in degrees
pub const CELL_SIZE: f64 = 0.25;

/// Cells in the test region
pub const REGION_CELLS: usize = 4;

/// Start of every scenario
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// Whole test region
pub fn region() -> BoundingBox {
    BoundingBox::new(49.0, 48.5, 2.5, 2.0).unwrap()
}

/// `[base + from h, base + to h)`
pub fn hours(from: i64, to: i64) -> TimeRange {
    TimeRange::new(base_time() + Duration::hours(from), base_time() + Duration::hours(to)).unwrap()
}

/// Sensor inside cell (1,0)
pub fn south_west() -> GeoPoint {
    GeoPoint::new(48.6, 2.1)
}

/// Sensor inside cell (1,1)
pub fn south_east() -> GeoPoint {
    GeoPoint::new(48.6, 2.4)
}

/// Sensor inside cell (0,0)
pub fn north_west() -> GeoPoint {
    GeoPoint::new(48.9, 2.1)
}

/// Engine wired to in-memory sources, a manual clock and a memory sink
pub struct Harness {
    pub engine: FusionEngine,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
    pub readings: Arc<MemorySensorSource>,
    pub satellites: Arc<MemorySatelliteSource>,
}

impl Harness {
    pub fn new(config: EngineConfig, readings: Vec<SensorReading>, observations: Vec<SatelliteObservation>, now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let sink = Arc::new(MemorySink::new());
        let readings = Arc::new(MemorySensorSource::new(readings));
        let satellites = Arc::new(MemorySatelliteSource::new(observations));
        let engine = FusionEngine::new(config, readings.clone(), satellites.clone())
            .unwrap()
            .with_clock(clock.clone())
            .with_sink(sink.clone());
        Self {
            engine,
            clock,
            sink,
            readings,
            satellites,
        }
    }
}

/// One sensor reading a constant value against a constant satellite
///
/// Six readings per hour for `hours` hours at [`south_west`].
pub fn constant_pair(sensor_value: f64, satellite_value: f64, hours: i64) -> (Vec<SensorReading>, Vec<SatelliteObservation>) {
    let model = SensorModel::new("s1", south_west());
    let mut rng = TestRng::new(7);
    let readings = sensor_series(&model, Pollutant::Pm25, |_| sensor_value, base_time(), hours, 6, &mut rng);
    let observations = hourly_observations(
        "cams_pm25",
        Pollutant::Pm25,
        region(),
        CELL_SIZE,
        |_| satellite_value,
        base_time(),
        hours,
    );
    (readings, observations)
}
