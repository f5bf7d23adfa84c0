//! Engine configuration
//!
//! Every threshold has a documented default (see `aerofuse_core::constants`)
//! and can be overridden from JSON:
//! ```json
//! {
//!   "pollutants": ["pm25", "no2"],
//!   "satellite_sources": ["cams_pm25", "tropomi_no2"],
//!   "resolution_minutes": 60,
//!   "validator": { "tolerance": 0.25 }
//! }
//! ```
//! Missing fields take their defaults.

use std::path::Path;

use aerofuse_core::constants::time::{
    DEFAULT_RESOLUTION_MINUTES, DEFAULT_RETRAIN_INTERVAL_HOURS, DEFAULT_RUN_BUDGET_MS, DEFAULT_TRAINING_WINDOW_HOURS,
};
use aerofuse_core::fusion::FusionConfig;
use aerofuse_core::temporal::{AlignerConfig, Resolution};
use aerofuse_core::validation::ValidatorConfig;
use aerofuse_core::Pollutant;
use aerofuse_ml::CalibrationConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Configuration for a [`crate::FusionEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pollutants fused on every run
    pub pollutants: Vec<Pollutant>,
    /// Satellite products queried per pollutant and window
    pub satellite_sources: Vec<String>,
    /// Alignment window width
    pub resolution_minutes: u32,
    /// Wall-clock budget of one fusion run
    pub run_budget_ms: u64,
    /// Interval between scheduled retrains
    pub retrain_interval_hours: u32,
    /// Trailing window gathered for scheduled retrains
    pub training_window_hours: u32,
    /// Temporal aligner settings
    pub aligner: AlignerConfig,
    /// Cross-validation thresholds
    pub validator: ValidatorConfig,
    /// Fusion weights
    pub fusion: FusionConfig,
    /// Calibration training settings
    pub calibration: CalibrationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pollutants: vec![Pollutant::Pm25],
            satellite_sources: vec!["cams_pm25".to_string()],
            resolution_minutes: DEFAULT_RESOLUTION_MINUTES,
            run_budget_ms: DEFAULT_RUN_BUDGET_MS,
            retrain_interval_hours: DEFAULT_RETRAIN_INTERVAL_HOURS,
            training_window_hours: DEFAULT_TRAINING_WINDOW_HOURS,
            aligner: AlignerConfig::default(),
            validator: ValidatorConfig::default(),
            fusion: FusionConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Set the fused pollutants
    pub fn with_pollutants(mut self, pollutants: impl Into<Vec<Pollutant>>) -> Self {
        self.pollutants = pollutants.into();
        self
    }

    /// Set the satellite products
    pub fn with_satellite_sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.satellite_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the run budget
    pub fn with_run_budget_ms(mut self, budget_ms: u64) -> Self {
        self.run_budget_ms = budget_ms;
        self
    }

    /// Set the calibration settings
    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Set the cross-validation thresholds
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Alignment resolution
    pub fn resolution(&self) -> EngineResult<Resolution> {
        Ok(Resolution::minutes(self.resolution_minutes)?)
    }

    /// Interval between scheduled retrains
    pub fn retrain_interval(&self) -> Duration {
        Duration::hours(self.retrain_interval_hours as i64)
    }

    /// Trailing window for scheduled retrains
    pub fn training_window(&self) -> Duration {
        Duration::hours(self.training_window_hours as i64)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> EngineResult<()> {
        if self.pollutants.is_empty() {
            return Err(EngineError::Config("at least one pollutant is required".into()));
        }
        if self.resolution_minutes == 0 {
            return Err(EngineError::Config("resolution_minutes must be positive".into()));
        }
        if self.run_budget_ms == 0 {
            return Err(EngineError::Config("run_budget_ms must be positive".into()));
        }
        if self.retrain_interval_hours == 0 || self.training_window_hours == 0 {
            return Err(EngineError::Config("retrain interval and training window must be positive".into()));
        }
        let v = &self.validator;
        if !(v.tolerance.is_finite() && v.tolerance > 0.0) {
            return Err(EngineError::Config(format!("validator.tolerance must be positive, got {}", v.tolerance)));
        }
        if !(0.0..=1.0).contains(&v.max_anomaly_rate) {
            return Err(EngineError::Config(format!(
                "validator.max_anomaly_rate must be in [0, 1], got {}",
                v.max_anomaly_rate
            )));
        }
        let c = &self.calibration;
        if !(c.train_fraction > 0.0 && c.train_fraction < 1.0) {
            return Err(EngineError::Config(format!(
                "calibration.train_fraction must be in (0, 1), got {}",
                c.train_fraction
            )));
        }
        if !(c.ridge_lambda.is_finite() && c.ridge_lambda >= 0.0) {
            return Err(EngineError::Config("calibration.ridge_lambda must be non-negative".into()));
        }
        let f = &self.fusion;
        if !(f.satellite_weight > 0.0 && f.sensor_weight > 0.0) {
            return Err(EngineError::Config("fusion weights must be positive".into()));
        }
        Ok(())
    }
}
