//! Time Constants
//!
//! Window resolutions, run budgets and scheduling intervals.

/// Milliseconds per second.
pub const MS_PER_SECOND: i64 = 1_000;

/// Milliseconds per minute.
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;

/// Default alignment window in minutes.
///
/// Geostationary and model products (CAMS) arrive hourly; polar orbiters
/// are coarser still. Sensors report every few minutes, so the satellite
/// cadence sets the common window.
///
/// Source: CAMS near-real-time product cadence
pub const DEFAULT_RESOLUTION_MINUTES: u32 = 60;

/// Default wall-clock budget for one fusion run in milliseconds.
///
/// Source: Dashboard request timeout
pub const DEFAULT_RUN_BUDGET_MS: u64 = 30_000;

/// Default interval between scheduled retraining attempts (one week).
///
/// Source: Weekly calibration cadence of the platform's retraining job
pub const DEFAULT_RETRAIN_INTERVAL_HOURS: u32 = 168;

/// Default trailing window of data used for retraining (30 days).
///
/// Source: Engineering judgment; one month covers weekday and seasonal
/// covariate variation while staying inside sensor drift timescales
pub const DEFAULT_TRAINING_WINDOW_HOURS: u32 = 720;
