//! Cross-Validation Constants
//!
//! Thresholds used to compare ground sensors against satellite reference
//! values and to decide whether a sensor is drifting.

/// Relative deviation above which a single pair counts as anomalous.
///
/// `|sensor - satellite| / satellite > 0.30` flags the pair.
///
/// Source: Low-cost PM sensor field evaluations (typical ±30% agreement band)
pub const DEFAULT_DEVIATION_TOLERANCE: f64 = 0.30;

/// Share of anomalous pairs above which a sensor is marked invalid.
///
/// Strictly greater: exactly half anomalous is still valid.
///
/// Source: Engineering judgment
pub const DEFAULT_MAX_ANOMALY_RATE: f64 = 0.5;

/// Minimum aligned pairs required before any verdict is trusted.
///
/// Source: Fewest points for which a correlation is meaningful
pub const MIN_VALIDATION_PAIRS: usize = 3;

/// Reference magnitudes at or below this are treated as zero.
pub const ZERO_REFERENCE_EPSILON: f64 = 1e-12;
