//! Upstream data sources
//!
//! The engine consumes two collaborators through traits and owns neither:
//! ```text
//! SensorReadingSource  ── ground network readings for a region/range
//! SatelliteSource      ── one gridded product per (source, pollutant, window)
//! ```
//! Calls are synchronous. A failed call is logged by the engine and treated
//! as missing data for that query.
//!
//! [`MemorySensorSource`] and [`MemorySatelliteSource`] serve pre-loaded
//! data for tests, benchmarks and replay.

use std::sync::{PoisonError, RwLock};

use aerofuse_core::{BoundingBox, Pollutant, SatelliteObservation, SensorReading, TimeRange};
use thiserror::Error;

/// Failure reported by an upstream source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Source unreachable or refused the query
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Response could not be parsed
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Ground sensor readings
pub trait SensorReadingSource: Send + Sync {
    /// Readings in `range`, optionally restricted to sensors and a region
    fn query(
        &self,
        sensor_ids: Option<&[String]>,
        range: &TimeRange,
        bbox: Option<&BoundingBox>,
    ) -> Result<Vec<SensorReading>, SourceError>;
}

/// Satellite and atmospheric-model products
pub trait SatelliteSource: Send + Sync {
    /// Observation of `source` for `pollutant` within `range` over `bbox`
    fn query(
        &self,
        source: &str,
        pollutant: Pollutant,
        range: &TimeRange,
        bbox: &BoundingBox,
    ) -> Result<Option<SatelliteObservation>, SourceError>;
}

/// Readings held in memory
#[derive(Debug, Default)]
pub struct MemorySensorSource {
    readings: RwLock<Vec<SensorReading>>,
}

impl MemorySensorSource {
    /// Source serving `readings`
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self { readings: RwLock::new(readings) }
    }

    /// Append more readings
    pub fn extend(&self, more: impl IntoIterator<Item = SensorReading>) {
        self.readings.write().unwrap_or_else(PoisonError::into_inner).extend(more);
    }
}

impl SensorReadingSource for MemorySensorSource {
    fn query(
        &self,
        sensor_ids: Option<&[String]>,
        range: &TimeRange,
        bbox: Option<&BoundingBox>,
    ) -> Result<Vec<SensorReading>, SourceError> {
        let readings = self.readings.read().unwrap_or_else(PoisonError::into_inner);
        Ok(readings
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .filter(|r| bbox.map_or(true, |b| b.contains(&r.location)))
            .filter(|r| sensor_ids.map_or(true, |ids| ids.iter().any(|id| *id == r.sensor_id)))
            .cloned()
            .collect())
    }
}

/// Observations held in memory
#[derive(Debug, Default)]
pub struct MemorySatelliteSource {
    observations: RwLock<Vec<SatelliteObservation>>,
}

impl MemorySatelliteSource {
    /// Source serving `observations`
    pub fn new(observations: Vec<SatelliteObservation>) -> Self {
        Self { observations: RwLock::new(observations) }
    }

    /// Append more observations
    pub fn extend(&self, more: impl IntoIterator<Item = SatelliteObservation>) {
        self.observations.write().unwrap_or_else(PoisonError::into_inner).extend(more);
    }
}

impl SatelliteSource for MemorySatelliteSource {
    /// Best-quality, then latest, matching observation
    fn query(
        &self,
        source: &str,
        pollutant: Pollutant,
        range: &TimeRange,
        bbox: &BoundingBox,
    ) -> Result<Option<SatelliteObservation>, SourceError> {
        let observations = self.observations.read().unwrap_or_else(PoisonError::into_inner);
        Ok(observations
            .iter()
            .filter(|o| o.source == source && o.pollutant == pollutant)
            .filter(|o| range.contains(o.observed_at) && o.bounds.intersects(bbox))
            .max_by_key(|o| (o.quality.rank(), o.observed_at))
            .cloned())
    }
}
