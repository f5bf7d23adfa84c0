//! Feature extraction for sensor calibration
//!
//! ## Feature Set
//!
//! | # | Feature        | Missing value          |
//! |---|----------------|------------------------|
//! | 0 | raw value      | never missing          |
//! | 1 | temperature    | training mean          |
//! | 2 | humidity       | training mean          |
//! | 3 | satellite ref  | training mean          |
//! | 4 | sin(hour)      | never missing          |
//! | 5 | cos(hour)      | never missing          |
//! | 6 | sensor age     | never missing          |
//!
//! Hour of day is encoded on the unit circle so 23:00 and 00:00 are
//! neighbours:
//! ```text
//! hour_sin = sin(2π × hour / 24)
//! hour_cos = cos(2π × hour / 24)
//! ```

use std::f64::consts::PI;

use aerofuse_core::temporal::SensorWindow;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Number of regression features
pub const FEATURE_COUNT: usize = 7;

/// Feature names in column order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "raw",
    "temperature",
    "humidity",
    "satellite",
    "hour_sin",
    "hour_cos",
    "sensor_age_days",
];

/// Column of the satellite reference feature
pub const SATELLITE_FEATURE: usize = 3;

/// Inputs for one calibrated prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFeatures {
    /// Window-mean raw value
    pub raw: f64,
    /// Ambient temperature in °C
    pub temperature: Option<f64>,
    /// Relative humidity in %
    pub humidity: Option<f64>,
    /// Satellite reference for the same window
    pub satellite: Option<f64>,
    /// Window start, for the hour-of-day features
    pub timestamp: DateTime<Utc>,
    /// Days since deployment
    pub sensor_age_days: f64,
}

impl SensorFeatures {
    /// Features of an aligned sensor window
    pub fn from_window(window: &SensorWindow) -> Self {
        Self {
            raw: window.value,
            temperature: window.temperature,
            humidity: window.humidity,
            satellite: window.reference.as_ref().map(|r| r.value),
            timestamp: window.window.start,
            sensor_age_days: window.sensor_age_days,
        }
    }

    /// Feature columns; `None` marks a value to impute
    pub fn encode(&self) -> [Option<f64>; FEATURE_COUNT] {
        let hour = self.timestamp.hour() as f64 + self.timestamp.minute() as f64 / 60.0;
        let angle = 2.0 * PI * hour / 24.0;
        [
            Some(self.raw),
            self.temperature,
            self.humidity,
            self.satellite,
            Some(angle.sin()),
            Some(angle.cos()),
            Some(self.sensor_age_days),
        ]
    }
}

/// Labelled training sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    /// Sensor the sample came from
    pub sensor_id: String,
    /// Model inputs
    pub features: SensorFeatures,
    /// Satellite reference value to learn
    pub reference: f64,
}

impl CalibrationSample {
    /// Sample from a window that has a satellite reference
    pub fn from_window(window: &SensorWindow) -> Option<Self> {
        let reference = window.reference.as_ref()?.value;
        Some(Self {
            sensor_id: window.sensor_id.clone(),
            features: SensorFeatures::from_window(window),
            reference,
        })
    }
}
