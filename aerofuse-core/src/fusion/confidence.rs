//! Confidence Scoring for Fused Estimates
//!
//! ## Overview
//!
//! Every fused point carries a confidence in [0, 1] so consumers can tell a
//! cross-checked estimate from a gap-filled one. The score depends on which
//! sources contributed and how much they agree.
//!
//! ## Scoring Regimes
//!
//! ### Both Sources
//! ```text
//! agreement = 1 / (1 + |sensor - satellite| / max(|satellite|, 1))
//! density   = 1 - 0.5ⁿ                 (n = contributing sensors)
//! support   = reliability × quality_factor
//!
//! confidence = 0.55 + 0.40 × (0.50 × agreement + 0.25 × density + 0.25 × support)
//! ```
//! Every term lies in [0, 1], so the score stays in [0.55, 0.95].
//!
//! ### Sensor Only
//! ```text
//! confidence = 0.75 × (0.5 × reliability + 0.5 × density)     ≤ 0.75
//! ```
//!
//! ### Satellite Only (gap fill)
//! ```text
//! confidence = 0.5 × quality_factor                            ≤ 0.50
//! ```
//! Always below the two-source floor.
//!
//! ## Implementation Notes
//!
//! - Inputs outside [0, 1] are clamped rather than rejected
//! - Scores are pure functions of their inputs; no history is kept

use core::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::constants::fusion::{
    SATELLITE_ONLY_CONFIDENCE_SCALE, SENSOR_ONLY_CONFIDENCE_CAP, TWO_SOURCE_CONFIDENCE_CEILING,
    TWO_SOURCE_CONFIDENCE_FLOOR,
};

/// Confidence score in range [0, 1]
///
/// 0.0 = no confidence, 1.0 = full confidence
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
    /// No confidence (0%)
    pub const ZERO: Self = Self(0.0);

    /// Moderate confidence (50%)
    pub const MODERATE: Self = Self(0.5);

    /// High confidence threshold (90%)
    pub const HIGH_THRESHOLD: Self = Self(0.9);

    /// Maximum confidence (100%)
    pub const MAX_CONFIDENCE: Self = Self(1.0);

    /// Create from a float, clamped to [0, 1]; NaN maps to zero
    pub fn from_float(confidence: f64) -> Self {
        if confidence.is_nan() {
            return Self::ZERO;
        }
        Self(confidence.clamp(0.0, 1.0))
    }

    /// Convert to floating point [0, 1]
    pub fn as_float(&self) -> f64 {
        self.0
    }

    /// Check if confidence meets a threshold
    pub fn meets_threshold(&self, threshold: Self) -> bool {
        self.0 >= threshold.0
    }
}

impl Mul for ConfidenceScore {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

/// Agreement between the sensor group and the satellite value
pub fn agreement(sensor: f64, satellite: f64) -> f64 {
    let normalized = (sensor - satellite).abs() / satellite.abs().max(1.0);
    1.0 / (1.0 + normalized)
}

/// Saturating bonus for additional sensors in the same cell
pub fn density(sensor_count: usize) -> f64 {
    1.0 - 0.5f64.powi(sensor_count.min(64) as i32)
}

/// Score for an estimate backed by sensors and a satellite
pub fn two_source(agreement: f64, density: f64, reliability: f64, quality_factor: f64) -> ConfidenceScore {
    let support = unit(reliability) * unit(quality_factor);
    let blend = 0.5 * unit(agreement) + 0.25 * unit(density) + 0.25 * support;
    let span = TWO_SOURCE_CONFIDENCE_CEILING - TWO_SOURCE_CONFIDENCE_FLOOR;
    ConfidenceScore::from_float(TWO_SOURCE_CONFIDENCE_FLOOR + span * blend)
}

/// Score for an estimate backed by sensors alone
pub fn sensor_only(reliability: f64, density: f64) -> ConfidenceScore {
    let blend = 0.5 * unit(reliability) + 0.5 * unit(density);
    ConfidenceScore::from_float(SENSOR_ONLY_CONFIDENCE_CAP * blend)
}

/// Score for a gap-filled satellite value
pub fn satellite_only(quality_factor: f64) -> ConfidenceScore {
    ConfidenceScore::from_float(SATELLITE_ONLY_CONFIDENCE_SCALE * unit(quality_factor))
}

fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
