//! Sensor/Satellite Fusion
//!
//! ## Overview
//!
//! Ground sensors are precise but sparse; satellite grids are dense but
//! coarse. For every location and window the aggregator combines whatever
//! is available into one estimate:
//! ```text
//! calibrated sensors ──┐
//!                      ├─→ weighted blend ─→ FusedDataPoint + confidence
//! satellite cell ──────┘
//! ```
//!
//! ## Weights
//!
//! ```text
//! reliability_i = max(r_i, 0)             (0.5 when r_i undefined)
//! support_i     = conf_i × (0.5 + 0.5 × reliability_i) × validity_i
//! w_i           = 0.50 × support_i
//! w_sat         = 0.35
//!
//! sensor = Σ(w_i × v_i) / Σw_i
//! fused  = (mean(w_i) × sensor + w_sat × satellite) / (mean(w_i) + w_sat)
//! ```
//! `conf_i` is the calibration model's per-prediction confidence and
//! `validity_i` drops to the invalid-sensor penalty when cross-validation
//! flagged the sensor.
//!
//! ## Outcomes
//!
//! | Sensors | Satellite | Result                              |
//! |---------|-----------|-------------------------------------|
//! | ≥ 1     | yes       | blend, confidence in [0.55, 0.95]   |
//! | ≥ 1     | no        | sensor mean, confidence ≤ 0.75      |
//! | 0       | yes       | gap fill, confidence ≤ 0.50         |
//! | 0       | no        | `NoContributingSource`, no point    |

pub mod confidence;
pub mod report;

pub use confidence::ConfidenceScore;
pub use report::{CompositeAqi, FusionReport, RunStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aqi::{AqiCategory, BreakpointTable};
use crate::constants::fusion::{
    INVALID_SENSOR_PENALTY, NEUTRAL_RELIABILITY, SATELLITE_BASE_WEIGHT, SENSOR_BASE_WEIGHT,
    UNCALIBRATED_CONFIDENCE,
};
use crate::errors::{FusionError, FusionResult};
use crate::model::{GeoPoint, Pollutant, QualityFlag};
use crate::spatial::CellId;

/// Weights for the fusion aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Base weight of the sensor group
    pub sensor_weight: f64,
    /// Fixed satellite weight
    pub satellite_weight: f64,
    /// Multiplier for sensors failing validation
    pub invalid_sensor_penalty: f64,
    /// Reliability used when correlation is undefined
    pub neutral_reliability: f64,
    /// Prediction confidence of uncalibrated sensor values
    pub uncalibrated_confidence: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sensor_weight: SENSOR_BASE_WEIGHT,
            satellite_weight: SATELLITE_BASE_WEIGHT,
            invalid_sensor_penalty: INVALID_SENSOR_PENALTY,
            neutral_reliability: NEUTRAL_RELIABILITY,
            uncalibrated_confidence: UNCALIBRATED_CONFIDENCE,
        }
    }
}

impl FusionConfig {
    /// Set the satellite weight
    pub fn with_satellite_weight(mut self, weight: f64) -> Self {
        self.satellite_weight = weight;
        self
    }

    /// Set the invalid-sensor penalty
    pub fn with_invalid_sensor_penalty(mut self, penalty: f64) -> Self {
        self.invalid_sensor_penalty = penalty;
        self
    }
}

/// Calibrated value of one sensor for one window
#[derive(Debug, Clone, PartialEq)]
pub struct SensorContribution {
    /// Sensor identifier
    pub sensor_id: String,
    /// Calibrated (or raw, when no model) value
    pub value: f64,
    /// Window-mean raw value
    pub raw: f64,
    /// Prediction confidence of the calibration model
    pub prediction_confidence: f64,
    /// Correlation with the satellite over the run horizon
    pub correlation: Option<f64>,
    /// Cross-validation verdict
    pub is_valid: bool,
    /// Sensor position
    pub location: GeoPoint,
}

/// Satellite value for the cell being fused
#[derive(Debug, Clone, PartialEq)]
pub struct SatelliteContribution {
    /// Product identifier
    pub source: String,
    /// Retrieved concentration
    pub value: f64,
    /// Retrieval uncertainty
    pub uncertainty: f64,
    /// Retrieval quality
    pub quality: QualityFlag,
}

/// Where and when a point is being fused
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionSite {
    /// Pollutant fused
    pub pollutant: Pollutant,
    /// Window start
    pub timestamp: DateTime<Utc>,
    /// Point location
    pub location: GeoPoint,
    /// Covering grid cell, if any
    pub cell: Option<CellId>,
}

/// One fused estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDataPoint {
    /// Pollutant estimated
    pub pollutant: Pollutant,
    /// Point location
    pub location: GeoPoint,
    /// Covering grid cell, if any
    pub cell: Option<CellId>,
    /// Window start
    pub timestamp: DateTime<Utc>,
    /// Weighted calibrated sensor value
    pub sensor_value: Option<f64>,
    /// Satellite value
    pub satellite_value: Option<f64>,
    /// Final estimate
    pub fused_value: f64,
    /// AQI of the estimate
    pub aqi: Option<u32>,
    /// AQI category
    pub category: Option<AqiCategory>,
    /// Confidence in [0, 1]
    pub confidence: ConfidenceScore,
    /// Contributing sensor ids and satellite product
    pub sources: Vec<String>,
}

/// Combines calibrated sensor values and satellite values
#[derive(Debug, Clone, Default)]
pub struct FusionAggregator {
    config: FusionConfig,
    breakpoints: BreakpointTable,
}

impl FusionAggregator {
    /// Aggregator with the given weights and AQI table
    pub fn new(config: FusionConfig, breakpoints: BreakpointTable) -> Self {
        Self { config, breakpoints }
    }

    /// Weights in use
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Reliability-and-validity support of one sensor in [0, 1]
    pub fn support(&self, sensor: &SensorContribution) -> f64 {
        let reliability = sensor
            .correlation
            .map(|r| r.max(0.0))
            .unwrap_or(self.config.neutral_reliability);
        let validity = if sensor.is_valid { 1.0 } else { self.config.invalid_sensor_penalty };
        (sensor.prediction_confidence * (0.5 + 0.5 * reliability) * validity).clamp(0.0, 1.0)
    }

    /// Fuse the contributions for one site
    ///
    /// Sensors with non-finite values and satellites with an invalid quality
    /// flag do not count as contributions.
    pub fn fuse(
        &self,
        site: FusionSite,
        sensors: &[SensorContribution],
        satellite: Option<&SatelliteContribution>,
    ) -> FusionResult<FusedDataPoint> {
        let sensors: Vec<&SensorContribution> = sensors.iter().filter(|s| s.value.is_finite()).collect();
        let satellite = satellite
            .filter(|s| s.value.is_finite())
            .and_then(|s| s.quality.factor().map(|q| (s, q)));

        let group = self.sensor_group(&sensors);

        let (fused_value, confidence) = match (&group, satellite) {
            (Some(g), Some((sat, quality))) => {
                let w_sat = self.config.satellite_weight;
                let fused = (g.weight * g.value + w_sat * sat.value) / (g.weight + w_sat);
                let score = confidence::two_source(
                    confidence::agreement(g.value, sat.value),
                    confidence::density(sensors.len()),
                    g.support,
                    quality,
                );
                (fused, score)
            }
            (Some(g), None) => (
                g.value,
                confidence::sensor_only(g.support, confidence::density(sensors.len())),
            ),
            (None, Some((sat, quality))) => (sat.value, confidence::satellite_only(quality)),
            (None, None) => return Err(FusionError::NoContributingSource),
        };

        let mut sources: Vec<String> = sensors.iter().map(|s| s.sensor_id.clone()).collect();
        sources.sort();
        sources.dedup();
        if let Some((sat, _)) = satellite {
            sources.push(sat.source.clone());
        }

        let aqi = self.breakpoints.reading(site.pollutant, fused_value);

        Ok(FusedDataPoint {
            pollutant: site.pollutant,
            location: site.location,
            cell: site.cell,
            timestamp: site.timestamp,
            sensor_value: group.as_ref().map(|g| g.value),
            satellite_value: satellite.map(|(s, _)| s.value),
            fused_value,
            aqi: aqi.map(|a| a.index),
            category: aqi.map(|a| a.category),
            confidence,
            sources,
        })
    }

    fn sensor_group(&self, sensors: &[&SensorContribution]) -> Option<SensorGroup> {
        if sensors.is_empty() {
            return None;
        }
        let n = sensors.len() as f64;

        let supports: Vec<f64> = sensors.iter().map(|s| self.support(s)).collect();
        let weights: Vec<f64> = supports.iter().map(|s| self.config.sensor_weight * s).collect();
        let weight_sum: f64 = weights.iter().sum();

        let value = if weight_sum > 0.0 {
            sensors.iter().zip(&weights).map(|(s, w)| s.value * w).sum::<f64>() / weight_sum
        } else {
            sensors.iter().map(|s| s.value).sum::<f64>() / n
        };

        Some(SensorGroup {
            value,
            weight: weight_sum / n,
            support: supports.iter().sum::<f64>() / n,
        })
    }
}

struct SensorGroup {
    value: f64,
    weight: f64,
    support: f64,
}
