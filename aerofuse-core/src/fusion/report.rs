//! Fusion run output

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aqi::{self, AqiCategory, AqiReading};
use crate::errors::FusionError;
use crate::fusion::FusedDataPoint;
use crate::model::{GeoPoint, Pollutant, TimeRange};

/// Whether a run finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunStatus {
    /// Every stage ran
    Complete,
    /// The run stopped early; points cover what finished
    Incomplete {
        /// Why the run stopped
        reason: FusionError,
    },
}

impl RunStatus {
    /// Whether the run finished
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Composite index at one location and time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeAqi {
    /// Point location
    pub location: GeoPoint,
    /// Window start
    pub timestamp: DateTime<Utc>,
    /// Highest per-pollutant index
    pub index: u32,
    /// Category of `index`
    pub category: AqiCategory,
    /// Pollutant that set the index
    pub dominant: Pollutant,
    /// Index of every pollutant at the point
    pub per_pollutant: BTreeMap<Pollutant, u32>,
}

/// Result of one fusion run
#[derive(Debug, Clone, PartialEq)]
pub struct FusionReport {
    /// Fused points in pollutant, window, location order
    pub points: Vec<FusedDataPoint>,
    /// Mean point confidence, 0 with no points
    pub summary_confidence: f64,
    /// Completion status
    pub status: RunStatus,
    /// Pollutants the run covered
    pub pollutants: Vec<Pollutant>,
    /// Requested range snapped to window boundaries
    pub span: TimeRange,
}

impl FusionReport {
    /// Build a report, deriving the summary confidence
    pub fn new(points: Vec<FusedDataPoint>, status: RunStatus, pollutants: Vec<Pollutant>, span: TimeRange) -> Self {
        let summary_confidence = if points.is_empty() {
            0.0
        } else {
            points.iter().map(|p| p.confidence.as_float()).sum::<f64>() / points.len() as f64
        };
        Self {
            points,
            summary_confidence,
            status,
            pollutants,
            span,
        }
    }

    /// Points of one pollutant
    pub fn points_for(&self, pollutant: Pollutant) -> impl Iterator<Item = &FusedDataPoint> {
        self.points.iter().filter(move |p| p.pollutant == pollutant)
    }

    /// Composite AQI per location and window
    ///
    /// Points of different pollutants are combined when they share a
    /// location and window start.
    pub fn composite_aqi(&self) -> Vec<CompositeAqi> {
        let mut grouped: BTreeMap<(DateTime<Utc>, u64, u64), (GeoPoint, Vec<AqiReading>)> = BTreeMap::new();

        for point in &self.points {
            let (Some(index), Some(category)) = (point.aqi, point.category) else {
                continue;
            };
            let key = (point.timestamp, point.location.lat.to_bits(), point.location.lon.to_bits());
            grouped
                .entry(key)
                .or_insert_with(|| (point.location, Vec::new()))
                .1
                .push(AqiReading {
                    pollutant: point.pollutant,
                    concentration: point.fused_value,
                    index,
                    category,
                });
        }

        grouped
            .into_iter()
            .filter_map(|((timestamp, _, _), (location, readings))| {
                let top = aqi::composite(&readings)?;
                Some(CompositeAqi {
                    location,
                    timestamp,
                    index: top.index,
                    category: top.category,
                    dominant: top.pollutant,
                    per_pollutant: readings.iter().map(|r| (r.pollutant, r.index)).collect(),
                })
            })
            .collect()
    }
}
