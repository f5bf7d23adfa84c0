//! Fusion Constants
//!
//! Source weights and the confidence envelope for fused estimates.

// ===== SOURCE WEIGHTS =====

/// Base weight of the ground-sensor group in a two-source blend.
///
/// Scaled down further by correlation, prediction confidence and validity.
///
/// Source: Platform source weighting (sensor 0.50)
pub const SENSOR_BASE_WEIGHT: f64 = 0.5;

/// Fixed weight of the satellite value in a two-source blend.
///
/// Source: Platform source weighting (satellite 0.35)
pub const SATELLITE_BASE_WEIGHT: f64 = 0.35;

/// Reliability assumed when a sensor's correlation is undefined.
///
/// Source: Midpoint of the reliability range
pub const NEUTRAL_RELIABILITY: f64 = 0.5;

/// Weight multiplier applied to sensors currently failing validation.
///
/// Source: Engineering judgment
pub const INVALID_SENSOR_PENALTY: f64 = 0.25;

/// Prediction confidence used when no calibration model is active.
///
/// Source: Platform sensor-only confidence for uncalibrated readings
pub const UNCALIBRATED_CONFIDENCE: f64 = 0.6;

/// Factor applied to the prediction confidence of sparse windows.
///
/// Source: Engineering judgment; one reading is a weak window mean
pub const SPARSE_WINDOW_CONFIDENCE_FACTOR: f64 = 0.5;

// ===== CONFIDENCE ENVELOPE =====

/// Lowest confidence of an estimate backed by both sources.
pub const TWO_SOURCE_CONFIDENCE_FLOOR: f64 = 0.55;

/// Highest confidence of an estimate backed by both sources.
pub const TWO_SOURCE_CONFIDENCE_CEILING: f64 = 0.95;

/// Cap for sensor-only estimates.
pub const SENSOR_ONLY_CONFIDENCE_CAP: f64 = 0.75;

/// Scale applied to the quality factor of satellite-only estimates.
///
/// Keeps gap-filled points at or below 0.5, under the two-source floor.
pub const SATELLITE_ONLY_CONFIDENCE_SCALE: f64 = 0.5;
