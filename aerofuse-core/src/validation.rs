//! Cross-Validation of Ground Sensors Against Satellite Reference
//!
//! ## Overview
//!
//! Low-cost sensors drift: optical PM counters over-read in humid air,
//! electrochemical cells lose sensitivity with age. The satellite product is
//! coarse but unbiased by local hardware, so agreement with it is the
//! sensor's health check.
//!
//! ## Statistics
//!
//! Computed over the aligned pairs of one sensor and one pollutant:
//! ```text
//! bias      = mean(sensor) - mean(satellite)
//! RMSE      = sqrt(mean((sensor - satellite)²))
//! MAE       = mean(|sensor - satellite|)
//! r         = cov(sensor, satellite) / (σ_sensor × σ_satellite)
//! deviation = |sensor - satellite| / satellite
//! ```
//!
//! ## Verdict
//!
//! - A pair is anomalous when its relative deviation exceeds the tolerance
//! - A pair against a zero reference has no defined deviation; it is left
//!   out of the anomaly rate but still counts toward bias and RMSE
//! - The sensor is invalid when the anomalous share exceeds the maximum
//!   rate, or when there are fewer pairs than the minimum
//! - Below the minimum there is no rate to speak of, so a single pair
//!   outside tolerance is enough to mark the sensor invalid as drifting
//!   rather than merely short of data
//!
//! ## Health Tracking
//!
//! [`HealthTracker`] remembers the last verdict per sensor and pollutant so
//! an anomaly signal is raised once, on the transition from valid to
//! invalid, rather than on every run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::constants::validation::{
    DEFAULT_DEVIATION_TOLERANCE, DEFAULT_MAX_ANOMALY_RATE, MIN_VALIDATION_PAIRS, ZERO_REFERENCE_EPSILON,
};
use crate::errors::{FusionError, FusionResult};
use crate::model::{Pollutant, TimeRange};
use crate::temporal::{AlignedPair, Alignment};

/// Relative deviation of a sensor value from its reference
///
/// `UndefinedDeviation` when the reference is zero.
pub fn relative_deviation(sensor: f64, reference: f64) -> FusionResult<f64> {
    if reference.abs() <= ZERO_REFERENCE_EPSILON {
        return Err(FusionError::UndefinedDeviation);
    }
    Ok((sensor - reference).abs() / reference.abs())
}

/// Pearson correlation, `None` with fewer than two points or zero variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

/// Thresholds for the cross-validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Relative deviation above which a pair is anomalous
    pub tolerance: f64,
    /// Anomalous share above which the sensor is invalid
    pub max_anomaly_rate: f64,
    /// Pairs needed for a verdict
    pub min_pairs: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_DEVIATION_TOLERANCE,
            max_anomaly_rate: DEFAULT_MAX_ANOMALY_RATE,
            min_pairs: MIN_VALIDATION_PAIRS,
        }
    }
}

impl ValidatorConfig {
    /// Set the per-pair tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum anomalous share
    pub fn with_max_anomaly_rate(mut self, rate: f64) -> Self {
        self.max_anomaly_rate = rate;
        self
    }

    /// Set the minimum pair count
    pub fn with_min_pairs(mut self, pairs: usize) -> Self {
        self.min_pairs = pairs;
        self
    }
}

/// Why a sensor failed validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    /// Too few pairs for a verdict
    InsufficientData {
        /// Pairs required
        required: usize,
        /// Pairs present
        available: usize,
    },
    /// Too many pairs outside tolerance
    AnomalyRateExceeded {
        /// Observed anomalous share
        rate: f64,
        /// Configured maximum
        threshold: f64,
    },
    /// Too few pairs for a rate, but one of them is outside tolerance
    PairOutsideTolerance {
        /// Largest relative deviation among the pairs
        deviation: f64,
        /// Configured tolerance
        tolerance: f64,
    },
}

/// Agreement of one sensor with the satellite over one window span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Sensor validated
    pub sensor_id: String,
    /// Pollutant compared
    pub pollutant: Pollutant,
    /// Span in alignment window boundaries
    pub window: TimeRange,
    /// Pairs considered
    pub sample_count: usize,
    /// Pearson correlation, absent when undefined
    pub correlation: Option<f64>,
    /// Mean sensor minus mean satellite
    pub bias: f64,
    /// Root mean squared difference
    pub rmse: f64,
    /// Mean absolute difference
    pub mae: f64,
    /// Mean relative deviation over defined pairs
    pub mean_deviation: f64,
    /// Largest relative deviation over defined pairs
    pub max_deviation: f64,
    /// Mean sensor value over the pairs
    pub mean_sensor: f64,
    /// Mean satellite value over the pairs
    pub mean_reference: f64,
    /// Pairs outside tolerance
    pub anomalous_pairs: usize,
    /// Pairs against a zero reference
    pub undefined_pairs: usize,
    /// Anomalous share of defined pairs
    pub anomaly_rate: f64,
    /// Verdict
    pub is_valid: bool,
    /// Reason for an invalid verdict
    pub reason: Option<InvalidReason>,
}

impl ValidationResult {
    /// Invalid because of drift, not because of missing data
    pub fn is_anomalous(&self) -> bool {
        matches!(
            self.reason,
            Some(InvalidReason::AnomalyRateExceeded { .. } | InvalidReason::PairOutsideTolerance { .. })
        )
    }
}

/// Computes agreement statistics and verdicts
#[derive(Debug, Clone, Default)]
pub struct CrossValidator {
    config: ValidatorConfig,
}

impl CrossValidator {
    /// Validator with the given thresholds
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate one sensor over `horizon`
    ///
    /// Pairs of other sensors or with windows outside the horizon are
    /// ignored.
    pub fn validate(
        &self,
        sensor_id: &str,
        pollutant: Pollutant,
        horizon: &TimeRange,
        pairs: &[AlignedPair<'_>],
    ) -> ValidationResult {
        let selected: Vec<&AlignedPair<'_>> = pairs
            .iter()
            .filter(|p| p.sensor_id() == sensor_id && horizon.encloses(&p.window().range()))
            .collect();

        let sensor: Vec<f64> = selected.iter().map(|p| p.sensor_value()).collect();
        let reference: Vec<f64> = selected.iter().map(|p| p.reference_value()).collect();
        let n = selected.len();

        let mut result = ValidationResult {
            sensor_id: sensor_id.to_string(),
            pollutant,
            window: *horizon,
            sample_count: n,
            correlation: pearson(&sensor, &reference),
            bias: 0.0,
            rmse: 0.0,
            mae: 0.0,
            mean_deviation: 0.0,
            max_deviation: 0.0,
            mean_sensor: 0.0,
            mean_reference: 0.0,
            anomalous_pairs: 0,
            undefined_pairs: 0,
            anomaly_rate: 0.0,
            is_valid: false,
            reason: None,
        };

        if n > 0 {
            let nf = n as f64;
            result.mean_sensor = sensor.iter().sum::<f64>() / nf;
            result.mean_reference = reference.iter().sum::<f64>() / nf;
            result.bias = result.mean_sensor - result.mean_reference;

            let mut sq = 0.0;
            let mut abs = 0.0;
            let mut deviation_sum = 0.0;
            let mut max_deviation = 0.0_f64;
            for (s, r) in sensor.iter().zip(&reference) {
                let diff = s - r;
                sq += diff * diff;
                abs += diff.abs();
                match relative_deviation(*s, *r) {
                    Ok(dev) => {
                        deviation_sum += dev;
                        max_deviation = max_deviation.max(dev);
                        if dev > self.config.tolerance {
                            result.anomalous_pairs += 1;
                        }
                    }
                    Err(_) => result.undefined_pairs += 1,
                }
            }
            result.rmse = (sq / nf).sqrt();
            result.mae = abs / nf;

            let defined = n - result.undefined_pairs;
            if defined > 0 {
                result.mean_deviation = deviation_sum / defined as f64;
                result.anomaly_rate = result.anomalous_pairs as f64 / defined as f64;
            }
            result.max_deviation = max_deviation;
        }

        result.reason = if n < self.config.min_pairs && result.anomalous_pairs > 0 {
            Some(InvalidReason::PairOutsideTolerance {
                deviation: result.max_deviation,
                tolerance: self.config.tolerance,
            })
        } else if n < self.config.min_pairs {
            Some(InvalidReason::InsufficientData {
                required: self.config.min_pairs,
                available: n,
            })
        } else if result.anomaly_rate > self.config.max_anomaly_rate {
            Some(InvalidReason::AnomalyRateExceeded {
                rate: result.anomaly_rate,
                threshold: self.config.max_anomaly_rate,
            })
        } else {
            None
        };
        result.is_valid = result.reason.is_none();
        result
    }

    /// Validate every sensor of an alignment over its snapped span
    pub fn validate_alignment(&self, alignment: &Alignment) -> Vec<ValidationResult> {
        let pairs = alignment.pairs();
        alignment
            .sensor_ids()
            .into_iter()
            .map(|id| self.validate(id, alignment.pollutant, &alignment.span, &pairs))
            .collect()
    }
}

/// Raised when a sensor turns from valid to invalid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    /// Sensor that started drifting
    pub sensor_id: String,
    /// Pollutant affected
    pub pollutant: Pollutant,
    /// Span the verdict covers
    pub window: TimeRange,
    /// Mean sensor value over the span
    pub sensor_value: f64,
    /// Mean satellite value over the span
    pub satellite_value: f64,
    /// Mean relative deviation in percent
    pub deviation_percent: f64,
    /// Anomalous share of pairs
    pub anomaly_rate: f64,
    /// When the transition was observed
    pub detected_at: DateTime<Utc>,
}

/// Last known health per sensor and pollutant
#[derive(Debug, Default)]
pub struct HealthTracker {
    healthy: HashMap<(String, Pollutant), bool>,
}

impl HealthTracker {
    /// Empty tracker; unknown sensors count as healthy
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a verdict, returning a signal on a valid → invalid transition
    ///
    /// Verdicts for lack of data carry no evidence and leave the state as is.
    pub fn observe(&mut self, result: &ValidationResult, at: DateTime<Utc>) -> Option<AnomalySignal> {
        if matches!(result.reason, Some(InvalidReason::InsufficientData { .. })) {
            return None;
        }

        let key = (result.sensor_id.clone(), result.pollutant);
        let was_healthy = self.healthy.get(&key).copied().unwrap_or(true);
        self.healthy.insert(key, result.is_valid);

        match (was_healthy, result.is_valid) {
            (true, false) => {
                warn!(
                    "Sensor {} {} drifting: {:.0}% of pairs outside tolerance (mean deviation {:.1}%)",
                    result.sensor_id,
                    result.pollutant,
                    result.anomaly_rate * 100.0,
                    result.mean_deviation * 100.0
                );
                Some(AnomalySignal {
                    sensor_id: result.sensor_id.clone(),
                    pollutant: result.pollutant,
                    window: result.window,
                    sensor_value: result.mean_sensor,
                    satellite_value: result.mean_reference,
                    deviation_percent: result.mean_deviation * 100.0,
                    anomaly_rate: result.anomaly_rate,
                    detected_at: at,
                })
            }
            (false, true) => {
                info!("Sensor {} {} back within tolerance", result.sensor_id, result.pollutant);
                None
            }
            _ => None,
        }
    }

    /// Whether the sensor is currently presumed healthy
    pub fn is_healthy(&self, sensor_id: &str, pollutant: Pollutant) -> bool {
        self.healthy
            .get(&(sensor_id.to_string(), pollutant))
            .copied()
            .unwrap_or(true)
    }
}
