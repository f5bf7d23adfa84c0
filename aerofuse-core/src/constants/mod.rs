//! Constants for AeroFuse Core
//!
//! This module provides centralized, documented constants used throughout
//! the fusion engine. Every threshold here is a *default*: the matching
//! config struct can override it at runtime.
//!
//! ## Organization
//!
//! Constants are grouped by domain:
//! - **Time**: Window resolutions, run budgets and retrain cadence
//! - **Validation**: Cross-validation tolerances and minimum evidence
//! - **Fusion**: Source weights and confidence bounds
//! - **Calibration**: Training minimums and regression settings
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. When adding new constants, document where the value comes from
//! 3. Use descriptive names that include units

/// Time-related constants for windows, budgets and retraining.
pub mod time;

/// Cross-validation thresholds.
pub mod validation;

/// Fusion weights and confidence bounds.
pub mod fusion;

/// Calibration training parameters.
pub mod calibration;

// Re-export commonly used constants for convenience
pub use time::{DEFAULT_RESOLUTION_MINUTES, DEFAULT_RUN_BUDGET_MS, DEFAULT_RETRAIN_INTERVAL_HOURS};

pub use validation::{DEFAULT_DEVIATION_TOLERANCE, DEFAULT_MAX_ANOMALY_RATE, MIN_VALIDATION_PAIRS};

pub use fusion::{
    SATELLITE_BASE_WEIGHT, SENSOR_BASE_WEIGHT,
    TWO_SOURCE_CONFIDENCE_FLOOR, TWO_SOURCE_CONFIDENCE_CEILING, SENSOR_ONLY_CONFIDENCE_CAP,
};

pub use calibration::{MIN_TRAINING_SAMPLES, TRAIN_FRACTION};
