//! Temporal Alignment of Sensor Readings and Satellite Observations
//!
//! ## Overview
//!
//! Ground sensors report every few minutes, satellites once an hour or once
//! a day. Before the two can be compared they are bucketed into common,
//! non-overlapping windows at the coarser of the two cadences:
//!
//! ```text
//! window index = floor(timestamp_ms / resolution_ms)
//!
//! sensor   ·· · ···· ·· ··· · ···· ···  ·· ···
//! satellite      ▲               ▲            ▲
//!          ├──────────────┼──────────────┼─────────────┤
//!               w₀             w₁             w₂
//! ```
//!
//! Windows are aligned to the Unix epoch, so two runs over overlapping
//! ranges produce identical window boundaries.
//!
//! ## Aggregation
//!
//! - Pollutant values within a window are averaged (not last-value)
//! - Covariates (temperature, humidity) average the readings that carry them
//! - Location is the mean reported position
//! - Windows with fewer readings than the configured minimum are kept and
//!   flagged `sparse`; readings are never interpolated or invented
//!
//! ## Pairing
//!
//! Each sensor window is paired with the satellite cell covering the sensor,
//! taken from an observation timestamped inside the same window. With
//! several candidates the best quality flag wins, then the latest
//! observation. A window with no usable observation (or an uncovered
//! sensor) stays in the alignment unpaired and flows on as sensor-only data.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::time::MS_PER_MINUTE;
use crate::errors::{FusionError, FusionResult};
use crate::model::{GeoPoint, Pollutant, QualityFlag, SatelliteObservation, SensorReading, TimeRange};
use crate::spatial::CellId;

/// Width of an alignment window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resolution {
    millis: i64,
}

impl Resolution {
    /// Resolution from a positive duration
    pub fn new(width: Duration) -> FusionResult<Self> {
        let millis = width.num_milliseconds();
        if millis <= 0 {
            return Err(FusionError::InvalidInput { reason: "resolution must be positive" });
        }
        Ok(Self { millis })
    }

    /// Resolution of `minutes` minutes
    pub fn minutes(minutes: u32) -> FusionResult<Self> {
        Self::new(Duration::milliseconds(minutes as i64 * MS_PER_MINUTE))
    }

    /// Coarser of two cadences
    pub fn coarser(a: Self, b: Self) -> Self {
        a.max(b)
    }

    /// Window width in milliseconds
    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Window width
    pub fn duration(&self) -> Duration {
        Duration::milliseconds(self.millis)
    }

    /// Window containing `t`
    pub fn window_of(&self, t: DateTime<Utc>) -> Window {
        let ms = t.timestamp_millis();
        let index = ms.div_euclid(self.millis);
        let start = t - Duration::milliseconds(ms - index * self.millis);
        Window {
            index,
            start,
            end: start + self.duration(),
        }
    }

    /// Windows covering `range`, first and last snapped outward
    pub fn windows(&self, range: &TimeRange) -> Vec<Window> {
        let mut windows = Vec::new();
        let mut current = self.window_of(range.start);
        while current.start < range.end {
            let next = current.end;
            windows.push(current);
            current = Window {
                index: current.index + 1,
                start: next,
                end: next + self.duration(),
            };
        }
        windows
    }

    /// Range snapped outward to whole windows
    pub fn snap(&self, range: &TimeRange) -> TimeRange {
        let first = self.window_of(range.start);
        let last = self.window_of(range.end - Duration::milliseconds(1));
        TimeRange {
            start: first.start,
            end: last.end,
        }
    }
}

/// One epoch-aligned alignment window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    /// Windows since the Unix epoch
    pub index: i64,
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl Window {
    /// Window as a time range
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    /// Whether `t` falls in this window
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Configuration for the temporal aligner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Readings a window needs before it is considered dense
    pub min_readings: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self { min_readings: 1 }
    }
}

/// Satellite value matched to a sensor window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Product the value came from
    pub source: String,
    /// Grid cell covering the sensor
    pub cell: CellId,
    /// Retrieved concentration
    pub value: f64,
    /// Retrieval uncertainty
    pub uncertainty: f64,
    /// Retrieval quality
    pub quality: QualityFlag,
    /// Observation time
    pub observed_at: DateTime<Utc>,
}

/// Aggregated readings of one sensor in one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorWindow {
    /// Sensor identifier
    pub sensor_id: String,
    /// Pollutant aggregated
    pub pollutant: Pollutant,
    /// Window the readings fell in
    pub window: Window,
    /// Mean raw concentration
    pub value: f64,
    /// Mean temperature of readings that reported it
    pub temperature: Option<f64>,
    /// Mean humidity of readings that reported it
    pub humidity: Option<f64>,
    /// Mean sensor age in days
    pub sensor_age_days: f64,
    /// Mean reported position
    pub location: GeoPoint,
    /// Readings aggregated
    pub reading_count: usize,
    /// Fewer readings than the configured minimum
    pub sparse: bool,
    /// Satellite value for the same window, if any
    pub reference: Option<Reference>,
}

/// Sensor window with a satellite reference
#[derive(Debug, Clone, Copy)]
pub struct AlignedPair<'a> {
    /// Sensor side
    pub sensor: &'a SensorWindow,
    /// Satellite side
    pub reference: &'a Reference,
}

impl<'a> AlignedPair<'a> {
    /// Window-mean sensor value
    pub fn sensor_value(&self) -> f64 {
        self.sensor.value
    }

    /// Satellite reference value
    pub fn reference_value(&self) -> f64 {
        self.reference.value
    }

    /// Sensor identifier
    pub fn sensor_id(&self) -> &'a str {
        &self.sensor.sensor_id
    }

    /// Window of the pair
    pub fn window(&self) -> &'a Window {
        &self.sensor.window
    }
}

/// Output of one alignment pass for a single pollutant
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Pollutant aligned
    pub pollutant: Pollutant,
    /// Window width used
    pub resolution: Resolution,
    /// Requested range snapped to window boundaries
    pub span: TimeRange,
    /// Sensor windows ordered by sensor then window
    pub windows: Vec<SensorWindow>,
}

impl Alignment {
    /// Windows that have a satellite reference
    pub fn pairs(&self) -> Vec<AlignedPair<'_>> {
        self.windows
            .iter()
            .filter_map(|w| {
                w.reference
                    .as_ref()
                    .map(|reference| AlignedPair { sensor: w, reference })
            })
            .collect()
    }

    /// Pairs of a single sensor
    pub fn pairs_for(&self, sensor_id: &str) -> Vec<AlignedPair<'_>> {
        self.pairs()
            .into_iter()
            .filter(|p| p.sensor_id() == sensor_id)
            .collect()
    }

    /// Distinct sensors with at least one window, sorted
    pub fn sensor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.windows.iter().map(|w| w.sensor_id.as_str()).collect();
        ids.dedup();
        ids
    }
}

#[derive(Default)]
struct WindowAccumulator {
    sum: f64,
    count: usize,
    temperature: (f64, usize),
    humidity: (f64, usize),
    age_sum: f64,
    lat_sum: f64,
    lon_sum: f64,
}

impl WindowAccumulator {
    fn push(&mut self, reading: &SensorReading, value: f64) {
        self.sum += value;
        self.count += 1;
        if let Some(t) = reading.temperature.filter(|t| t.is_finite()) {
            self.temperature.0 += t;
            self.temperature.1 += 1;
        }
        if let Some(h) = reading.humidity.filter(|h| h.is_finite()) {
            self.humidity.0 += h;
            self.humidity.1 += 1;
        }
        self.age_sum += reading.sensor_age_days;
        self.lat_sum += reading.location.lat;
        self.lon_sum += reading.location.lon;
    }

    fn mean_of((sum, n): (f64, usize)) -> Option<f64> {
        (n > 0).then(|| sum / n as f64)
    }
}

/// Buckets readings and observations into common windows
#[derive(Debug, Clone)]
pub struct TemporalAligner {
    config: AlignerConfig,
    resolution: Resolution,
}

impl TemporalAligner {
    /// Aligner at a fixed resolution
    pub fn new(resolution: Resolution, config: AlignerConfig) -> Self {
        Self { config, resolution }
    }

    /// Window width in use
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Align one pollutant over `range`
    ///
    /// Readings outside `range` or without a finite value for the pollutant
    /// are ignored. Observations for other pollutants or with an invalid
    /// quality flag never become references.
    pub fn align(
        &self,
        pollutant: Pollutant,
        readings: &[SensorReading],
        observations: &[SatelliteObservation],
        range: &TimeRange,
    ) -> Alignment {
        let mut buckets: BTreeMap<(String, i64), (Window, WindowAccumulator)> = BTreeMap::new();

        for reading in readings {
            if !range.contains(reading.timestamp) {
                continue;
            }
            let value = match reading.value(pollutant) {
                Some(v) if v.is_finite() => v,
                Some(_) => {
                    debug!("Skipping non-finite {} value from {}", pollutant, reading.sensor_id);
                    continue;
                }
                None => continue,
            };

            let window = self.resolution.window_of(reading.timestamp);
            let (_, acc) = buckets
                .entry((reading.sensor_id.clone(), window.index))
                .or_insert_with(|| (window, WindowAccumulator::default()));
            acc.push(reading, value);
        }

        let candidates: Vec<&SatelliteObservation> = observations
            .iter()
            .filter(|o| o.pollutant == pollutant && o.quality.is_usable())
            .collect();

        let windows = buckets
            .into_iter()
            .map(|((sensor_id, _), (window, acc))| {
                let n = acc.count as f64;
                let location = GeoPoint::new(acc.lat_sum / n, acc.lon_sum / n);
                let reference = best_reference(&candidates, &window, &location);
                if reference.is_none() {
                    debug!("No {} reference for {} in window {}", pollutant, sensor_id, window.index);
                }

                SensorWindow {
                    pollutant,
                    window,
                    value: acc.sum / n,
                    temperature: WindowAccumulator::mean_of(acc.temperature),
                    humidity: WindowAccumulator::mean_of(acc.humidity),
                    sensor_age_days: acc.age_sum / n,
                    location,
                    reading_count: acc.count,
                    sparse: acc.count < self.config.min_readings,
                    reference,
                    sensor_id,
                }
            })
            .collect();

        Alignment {
            pollutant,
            resolution: self.resolution,
            span: self.resolution.snap(range),
            windows,
        }
    }
}

fn best_reference(
    candidates: &[&SatelliteObservation],
    window: &Window,
    location: &GeoPoint,
) -> Option<Reference> {
    candidates
        .iter()
        .filter(|o| window.contains(o.observed_at))
        .filter_map(|o| o.value_at(location).ok().map(|(cell, v)| (*o, cell, v)))
        .max_by_key(|(o, _, _)| (o.quality.rank(), o.observed_at))
        .map(|(o, cell, v)| Reference {
            source: o.source.clone(),
            cell,
            value: v.value,
            uncertainty: v.uncertainty,
            quality: o.quality,
            observed_at: o.observed_at,
        })
}
