//! Calibration Constants
//!
//! Training minimums and regression settings for sensor calibration.

/// Minimum aligned samples needed to train a calibration model.
///
/// Source: Rule of thumb of ~5 samples per regression feature
pub const MIN_TRAINING_SAMPLES: usize = 30;

/// Share of samples (by order) used for fitting; the rest is held out.
///
/// Source: Conventional 80/20 split
pub const TRAIN_FRACTION: f64 = 0.8;

/// Ridge penalty on standardized regression weights.
///
/// Small enough not to bias well-conditioned fits, large enough to keep
/// the normal equations positive definite when a covariate is constant.
pub const DEFAULT_RIDGE_LAMBDA: f64 = 1e-3;
