//! Data model shared by every stage of the fusion pipeline
//!
//! Readings and observations are immutable once recorded: stages derive new
//! values from them (window means, pairs, fused points) and never edit them
//! in place.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{FusionError, FusionResult};
use crate::spatial::{CellId, GridIndex};

/// Pollutants tracked by the engine
///
/// Each pollutant owns its unit, its AQI breakpoint table and its
/// calibration model slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    /// Fine particulate matter (≤2.5 µm)
    Pm25,
    /// Coarse particulate matter (≤10 µm)
    Pm10,
    /// Nitrogen dioxide
    No2,
    /// Sulphur dioxide
    So2,
    /// Ozone
    O3,
    /// Carbon monoxide
    Co,
}

impl Pollutant {
    /// Every pollutant, in slot order
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::O3,
        Pollutant::Co,
    ];

    /// Stable lowercase name, also used for artifact paths
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pm25 => "pm25",
            Self::Pm10 => "pm10",
            Self::No2 => "no2",
            Self::So2 => "so2",
            Self::O3 => "o3",
            Self::Co => "co",
        }
    }

    /// Concentration unit the breakpoint tables are expressed in
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Pm25 | Self::Pm10 => "µg/m³",
            Self::No2 | Self::So2 | Self::O3 => "ppb",
            Self::Co => "ppm",
        }
    }

    /// Dense index into per-pollutant tables
    pub fn index(&self) -> usize {
        match self {
            Self::Pm25 => 0,
            Self::Pm10 => 1,
            Self::No2 => 2,
            Self::So2 => 3,
            Self::O3 => 4,
            Self::Co => 5,
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude, positive north
    pub lat: f64,
    /// Longitude, positive east
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned latitude/longitude box, edges inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Northern edge (max latitude)
    pub north: f64,
    /// Southern edge (min latitude)
    pub south: f64,
    /// Eastern edge (max longitude)
    pub east: f64,
    /// Western edge (min longitude)
    pub west: f64,
}

impl BoundingBox {
    /// Create a box, rejecting inverted or out-of-range edges
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> FusionResult<Self> {
        let bbox = Self { north, south, east, west };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Smallest box containing every point, `None` for an empty slice
    pub fn enclosing(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            north: first.lat,
            south: first.lat,
            east: first.lon,
            west: first.lon,
        };
        for p in &points[1..] {
            bbox.north = bbox.north.max(p.lat);
            bbox.south = bbox.south.min(p.lat);
            bbox.east = bbox.east.max(p.lon);
            bbox.west = bbox.west.min(p.lon);
        }
        Some(bbox)
    }

    /// Check edge ordering and coordinate ranges
    pub fn validate(&self) -> FusionResult<()> {
        let finite = [self.north, self.south, self.east, self.west]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(FusionError::InvalidInput { reason: "bounding box edges must be finite" });
        }
        if self.south > self.north || self.south < -90.0 || self.north > 90.0 {
            return Err(FusionError::InvalidInput { reason: "latitude edges out of order or range" });
        }
        if self.west > self.east || self.west < -180.0 || self.east > 180.0 {
            return Err(FusionError::InvalidInput { reason: "longitude edges out of order or range" });
        }
        Ok(())
    }

    /// Whether the point lies inside or on the edge of the box
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }

    /// Whether the two boxes share any point, edges included
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.south <= other.north
            && other.south <= self.north
            && self.west <= other.east
            && other.west <= self.east
    }

    /// Geometric centre
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new((self.north + self.south) / 2.0, (self.east + self.west) / 2.0)
    }
}

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted intervals
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> FusionResult<Self> {
        if end <= start {
            return Err(FusionError::InvalidInput { reason: "time range end must follow start" });
        }
        Ok(Self { start, end })
    }

    /// Range of `length` ending at `end`
    pub fn trailing(end: DateTime<Utc>, length: Duration) -> FusionResult<Self> {
        Self::new(end - length, end)
    }

    /// Whether `t` falls in `[start, end)`
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether the two ranges share any instant
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely inside this range
    pub fn encloses(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Length of the range
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// One report from a ground sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Sensor identifier
    pub sensor_id: String,
    /// Sensor position
    pub location: GeoPoint,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Raw concentrations, per pollutant
    pub values: BTreeMap<Pollutant, f64>,
    /// Ambient temperature in °C
    pub temperature: Option<f64>,
    /// Relative humidity in %
    pub humidity: Option<f64>,
    /// Days since the sensor was deployed
    pub sensor_age_days: f64,
}

impl SensorReading {
    /// Reading with no pollutant values yet
    pub fn new(sensor_id: impl Into<String>, location: GeoPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            location,
            timestamp,
            values: BTreeMap::new(),
            temperature: None,
            humidity: None,
            sensor_age_days: 0.0,
        }
    }

    /// Add a raw pollutant value
    pub fn with_value(mut self, pollutant: Pollutant, value: f64) -> Self {
        self.values.insert(pollutant, value);
        self
    }

    /// Set ambient temperature
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    /// Set relative humidity
    pub fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    /// Set sensor age
    pub fn with_age_days(mut self, days: f64) -> Self {
        self.sensor_age_days = days;
        self
    }

    /// Raw value for a pollutant, if reported
    pub fn value(&self, pollutant: Pollutant) -> Option<f64> {
        self.values.get(&pollutant).copied()
    }
}

/// Retrieval quality reported with a satellite product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    /// Clear-sky retrieval
    Good,
    /// Partially cloudy or high solar angle
    Medium,
    /// Usable with caution
    Low,
    /// Never used as a reference
    Invalid,
}

impl QualityFlag {
    /// Confidence multiplier, `None` for invalid retrievals
    pub fn factor(&self) -> Option<f64> {
        match self {
            Self::Good => Some(1.0),
            Self::Medium => Some(0.75),
            Self::Low => Some(0.5),
            Self::Invalid => None,
        }
    }

    /// Whether the observation may serve as a reference
    pub fn is_usable(&self) -> bool {
        self.factor().is_some()
    }

    /// Preference order, higher is better
    pub fn rank(&self) -> u8 {
        match self {
            Self::Good => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::Invalid => 0,
        }
    }
}

/// Value stored for one satellite grid cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellValue {
    /// Retrieved concentration
    pub value: f64,
    /// One-sigma retrieval uncertainty
    pub uncertainty: f64,
}

/// Parsed satellite or atmospheric-model product for one pollutant
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteObservation {
    /// Product identifier, e.g. `cams_pm25`
    pub source: String,
    /// Pollutant the grid holds
    pub pollutant: Pollutant,
    /// Observation time
    pub observed_at: DateTime<Utc>,
    /// Grid footprint
    pub bounds: BoundingBox,
    /// Cell height in degrees latitude
    pub cell_size_lat: f64,
    /// Cell width in degrees longitude
    pub cell_size_lon: f64,
    /// Stored cells; missing cells mean no retrieval
    pub cells: HashMap<CellId, CellValue>,
    /// Retrieval quality of the product
    pub quality: QualityFlag,
}

impl SatelliteObservation {
    /// Empty observation over a footprint
    pub fn new(
        source: impl Into<String>,
        pollutant: Pollutant,
        observed_at: DateTime<Utc>,
        bounds: BoundingBox,
        cell_size_lat: f64,
        cell_size_lon: f64,
        quality: QualityFlag,
    ) -> Self {
        Self {
            source: source.into(),
            pollutant,
            observed_at,
            bounds,
            cell_size_lat,
            cell_size_lon,
            cells: HashMap::new(),
            quality,
        }
    }

    /// Store a value for one cell
    pub fn with_cell(mut self, cell: CellId, value: f64, uncertainty: f64) -> Self {
        self.cells.insert(cell, CellValue { value, uncertainty });
        self
    }

    /// Store the same value in every cell of the grid
    pub fn with_uniform(mut self, value: f64, uncertainty: f64) -> FusionResult<Self> {
        let grid = self.grid()?;
        for cell in grid.cells() {
            self.cells.insert(cell, CellValue { value, uncertainty });
        }
        Ok(self)
    }

    /// Spatial index over the observation footprint
    pub fn grid(&self) -> FusionResult<GridIndex> {
        GridIndex::new(self.bounds, self.cell_size_lat, self.cell_size_lon)
    }

    /// Covering cell and its value
    ///
    /// `NotCovered` when the point is outside the footprint or the covering
    /// cell has no retrieval.
    pub fn value_at(&self, point: &GeoPoint) -> FusionResult<(CellId, CellValue)> {
        let cell = self.grid()?.locate(point).ok_or(FusionError::NotCovered)?;
        self.cells
            .get(&cell)
            .map(|v| (cell, *v))
            .ok_or(FusionError::NotCovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn bbox_rejects_inverted_edges() {
        assert!(BoundingBox::new(40.0, 41.0, 10.0, 9.0).is_err());
        assert!(BoundingBox::new(41.0, 40.0, 9.0, 10.0).is_err());
        assert!(BoundingBox::new(91.0, 40.0, 10.0, 9.0).is_err());
        assert!(BoundingBox::new(41.0, 40.0, 10.0, 9.0).is_ok());
    }

    #[test]
    fn bbox_edges_are_inclusive() {
        let bbox = BoundingBox::new(41.0, 40.0, 10.0, 9.0).unwrap();
        assert!(bbox.contains(&GeoPoint::new(41.0, 10.0)));
        assert!(bbox.contains(&GeoPoint::new(40.0, 9.0)));
        assert!(!bbox.contains(&GeoPoint::new(41.0001, 9.5)));
        assert_eq!(bbox.center(), GeoPoint::new(40.5, 9.5));
    }

    #[test]
    fn bbox_intersection_includes_touching_edges() {
        let a = BoundingBox::new(41.0, 40.0, 10.0, 9.0).unwrap();
        let touching = BoundingBox::new(42.0, 41.0, 11.0, 10.0).unwrap();
        let apart = BoundingBox::new(45.0, 44.0, 10.0, 9.0).unwrap();
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&apart));
    }

    #[test]
    fn enclosing_box_spans_points() {
        let bbox = BoundingBox::enclosing(&[
            GeoPoint::new(40.2, 9.1),
            GeoPoint::new(40.8, 9.9),
            GeoPoint::new(40.5, 9.4),
        ])
        .unwrap();
        assert_eq!((bbox.south, bbox.north), (40.2, 40.8));
        assert_eq!((bbox.west, bbox.east), (9.1, 9.9));
        assert!(BoundingBox::enclosing(&[]).is_none());
    }

    #[test]
    fn time_range_is_half_open() {
        let range = TimeRange::new(t(0), t(3)).unwrap();
        assert!(range.contains(t(0)));
        assert!(range.contains(t(2)));
        assert!(!range.contains(t(3)));
        assert!(TimeRange::new(t(3), t(3)).is_err());
    }

    #[test]
    fn range_overlap_and_enclosure() {
        let outer = TimeRange::new(t(0), t(6)).unwrap();
        let inner = TimeRange::new(t(1), t(2)).unwrap();
        let after = TimeRange::new(t(6), t(7)).unwrap();
        assert!(outer.encloses(&inner));
        assert!(outer.overlaps(&inner));
        assert!(!outer.overlaps(&after));
    }

    #[test]
    fn invalid_quality_is_unusable() {
        assert!(!QualityFlag::Invalid.is_usable());
        assert_eq!(QualityFlag::Medium.factor(), Some(0.75));
        assert!(QualityFlag::Good.rank() > QualityFlag::Low.rank());
    }

    #[test]
    fn pollutant_serializes_lowercase() {
        let json = serde_json::to_string(&Pollutant::Pm25).unwrap();
        assert_eq!(json, "\"pm25\"");
        let back: Pollutant = serde_json::from_str("\"no2\"").unwrap();
        assert_eq!(back, Pollutant::No2);
    }

    #[test]
    fn observation_lookup_reports_empty_cells() {
        let bounds = BoundingBox::new(41.0, 40.0, 10.0, 9.0).unwrap();
        let obs = SatelliteObservation::new("cams_pm25", Pollutant::Pm25, t(0), bounds, 0.5, 0.5, QualityFlag::Good)
            .with_cell(CellId::new(0, 0), 12.0, 1.0);

        let (cell, value) = obs.value_at(&GeoPoint::new(40.2, 9.2)).unwrap();
        assert_eq!(cell, CellId::new(0, 0));
        assert_eq!(value.value, 12.0);

        // Covered by the grid but no retrieval stored
        assert_eq!(obs.value_at(&GeoPoint::new(40.7, 9.7)), Err(FusionError::NotCovered));
        // Outside the footprint
        assert_eq!(obs.value_at(&GeoPoint::new(42.0, 9.7)), Err(FusionError::NotCovered));
    }
}
