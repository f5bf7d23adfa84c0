//! Calibration regression
//!
//! ## Overview
//!
//! A calibration model maps a sensor's raw window mean plus covariates to
//! the satellite-referenced concentration:
//! ```text
//! ŷ = β₀ + Σ βⱼ × zⱼ          zⱼ = (xⱼ - μⱼ) / σⱼ
//! correction = ŷ - raw
//! ```
//!
//! Weights come from ridge-regularised least squares on standardised
//! features, solved through the Cholesky factor of the normal equations:
//! ```text
//! (ZᵀZ + λ·n·I′) β = Zᵀy          I′ = identity without the intercept
//! ```
//! The small ridge term keeps the system positive definite when a covariate
//! is constant (e.g. humidity never reported).
//!
//! ## Satellite Feature
//!
//! The reference value for the same window is an input as well as the
//! target. The held-out split is the most recent data, so held-out metrics
//! still measure the model on windows it never fitted; disable the feature
//! with [`CalibrationConfig::with_satellite_feature`] to score the sensor
//! hardware alone.
//!
//! ## Train / Evaluate Split
//!
//! Samples are split by order, not at random: the first 80% fit the model,
//! the last 20% (at least one sample) are held out. Callers pass samples in
//! chronological order, so the held-out part is the most recent data.
//!
//! ## Determinism
//!
//! Fitting has no random state and prediction is a pure function of the
//! parameters, so identical inputs always give identical outputs.

use std::collections::BTreeMap;

use aerofuse_core::constants::calibration::{DEFAULT_RIDGE_LAMBDA, MIN_TRAINING_SAMPLES, TRAIN_FRACTION};
use aerofuse_core::Pollutant;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{CalibrationError, CalibrationResult};
use crate::features::{CalibrationSample, SensorFeatures, FEATURE_COUNT, FEATURE_NAMES, SATELLITE_FEATURE};
use crate::linalg::{self, SquareMatrix, Vector};
use crate::metrics::ErrorMetrics;

/// Intercept plus features
const DIM: usize = FEATURE_COUNT + 1;

/// Scales below this are treated as a constant column
const MIN_FEATURE_SCALE: f64 = 1e-9;

/// Settings for calibration training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Samples required before training
    pub min_samples: usize,
    /// Share of samples used for fitting
    pub train_fraction: f64,
    /// Ridge penalty per training sample
    pub ridge_lambda: f64,
    /// Feed the satellite reference in as a feature
    ///
    /// Windows without a reference are imputed with the training mean, so
    /// sensor-only windows still get a calibrated value.
    pub use_satellite_feature: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_TRAINING_SAMPLES,
            train_fraction: TRAIN_FRACTION,
            ridge_lambda: DEFAULT_RIDGE_LAMBDA,
            use_satellite_feature: true,
        }
    }
}

impl CalibrationConfig {
    /// Set the training minimum
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Enable or disable the satellite feature
    pub fn with_satellite_feature(mut self, enabled: bool) -> Self {
        self.use_satellite_feature = enabled;
        self
    }
}

/// Calibrated value for one sensor window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Calibrated concentration
    pub value: f64,
    /// Raw input value
    pub raw: f64,
    /// `value - raw`
    pub correction: f64,
    /// Confidence in [0, 1] from the residual spread
    pub confidence: f64,
    /// Model version that produced the value
    pub model_version: u32,
}

/// Trained, immutable model for one pollutant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    /// Pollutant calibrated
    pub pollutant: Pollutant,
    /// Version, unique per pollutant
    pub version: u32,
    /// Training time
    pub trained_at: DateTime<Utc>,
    /// Whether the satellite feature is used
    pub use_satellite_feature: bool,
    /// Training means, also used to impute missing covariates
    pub feature_means: [f64; FEATURE_COUNT],
    /// Training standard deviations
    pub feature_scales: [f64; FEATURE_COUNT],
    /// Weights on standardised features
    pub weights: [f64; FEATURE_COUNT],
    /// Intercept
    pub intercept: f64,
    /// Residual standard deviation on the training split
    pub residual_std: f64,
    /// Metrics on the held-out split
    pub holdout: ErrorMetrics,
    /// Samples provided
    pub sample_count: usize,
    /// Samples used for fitting
    pub train_count: usize,
    /// Samples held out
    pub eval_count: usize,
    /// Relative magnitude of each standardised weight
    pub feature_importance: BTreeMap<String, f64>,
}

impl CalibrationParameters {
    /// Calibrated value for one window
    pub fn predict(&self, features: &SensorFeatures) -> Prediction {
        let value = self.predict_value(features);
        let scale = value.abs().max(1.0);
        Prediction {
            value,
            raw: features.raw,
            correction: value - features.raw,
            confidence: 1.0 / (1.0 + self.residual_std / scale),
            model_version: self.version,
        }
    }

    /// Score the model against labelled samples without changing it
    pub fn evaluate(&self, samples: &[CalibrationSample]) -> ErrorMetrics {
        let predictions: Vec<f64> = samples.iter().map(|s| self.predict_value(&s.features)).collect();
        let targets: Vec<f64> = samples.iter().map(|s| s.reference).collect();
        ErrorMetrics::compute(&predictions, &targets)
    }

    fn predict_value(&self, features: &SensorFeatures) -> f64 {
        let row = impute(&encode(features, self.use_satellite_feature), &self.feature_means);
        let z = standardize(&row, &self.feature_means, &self.feature_scales);
        self.intercept + (0..FEATURE_COUNT).map(|j| self.weights[j] * z[j + 1]).sum::<f64>()
    }
}

/// Split samples by order into fitting and held-out parts
pub fn split(samples: &[CalibrationSample], train_fraction: f64) -> (&[CalibrationSample], &[CalibrationSample]) {
    let n = samples.len();
    if n < 2 {
        return (samples, &[]);
    }
    let eval_len = ((n as f64) * (1.0 - train_fraction.clamp(0.0, 1.0))).round() as usize;
    let eval_len = eval_len.clamp(1, n - 1);
    samples.split_at(n - eval_len)
}

/// Fit a model on `samples`
///
/// `InsufficientData` below the configured minimum, `SingularSystem` when
/// the normal equations cannot be solved.
pub fn fit(
    pollutant: Pollutant,
    samples: &[CalibrationSample],
    config: &CalibrationConfig,
    version: u32,
    trained_at: DateTime<Utc>,
) -> CalibrationResult<CalibrationParameters> {
    let required = config.min_samples.max(2);
    if samples.len() < required {
        return Err(CalibrationError::InsufficientData {
            pollutant,
            required,
            available: samples.len(),
        });
    }

    let (train, eval) = split(samples, config.train_fraction);
    let encoded: Vec<[Option<f64>; FEATURE_COUNT]> = train
        .iter()
        .map(|s| encode(&s.features, config.use_satellite_feature))
        .collect();

    let means = column_means(&encoded);
    let rows: Vec<[f64; FEATURE_COUNT]> = encoded.iter().map(|r| impute(r, &means)).collect();
    let scales = column_scales(&rows, &means);

    let mut a: SquareMatrix<DIM> = [[0.0; DIM]; DIM];
    let mut b: Vector<DIM> = [0.0; DIM];
    for (row, sample) in rows.iter().zip(train) {
        let z = standardize(row, &means, &scales);
        for i in 0..DIM {
            b[i] += z[i] * sample.reference;
            for j in 0..DIM {
                a[i][j] += z[i] * z[j];
            }
        }
    }
    let penalty = config.ridge_lambda.max(0.0) * train.len() as f64;
    for (i, row) in a.iter_mut().enumerate().skip(1) {
        row[i] += penalty;
    }

    let beta = linalg::solve_spd(&a, &b).ok_or(CalibrationError::SingularSystem { pollutant })?;

    let mut weights = [0.0; FEATURE_COUNT];
    weights.copy_from_slice(&beta[1..]);

    let mut params = CalibrationParameters {
        pollutant,
        version,
        trained_at,
        use_satellite_feature: config.use_satellite_feature,
        feature_means: means,
        feature_scales: scales,
        weights,
        intercept: beta[0],
        residual_std: 0.0,
        holdout: ErrorMetrics::compute(&[], &[]),
        sample_count: samples.len(),
        train_count: train.len(),
        eval_count: eval.len(),
        feature_importance: importance(&weights),
    };

    params.residual_std = params.evaluate(train).rmse;
    params.holdout = params.evaluate(eval);

    debug!(
        "Fitted {} v{}: train={} eval={} holdout rmse={:.3} r2={:.3}",
        pollutant, version, params.train_count, params.eval_count, params.holdout.rmse, params.holdout.r_squared
    );

    Ok(params)
}

fn encode(features: &SensorFeatures, use_satellite: bool) -> [Option<f64>; FEATURE_COUNT] {
    let mut encoded = features.encode();
    if !use_satellite {
        encoded[SATELLITE_FEATURE] = None;
    }
    // Non-finite covariates are treated as missing
    for v in encoded.iter_mut() {
        if v.is_some_and(|x| !x.is_finite()) {
            *v = None;
        }
    }
    encoded
}

fn column_means(rows: &[[Option<f64>; FEATURE_COUNT]]) -> [f64; FEATURE_COUNT] {
    let mut means = [0.0; FEATURE_COUNT];
    for (j, mean) in means.iter_mut().enumerate() {
        let present: Vec<f64> = rows.iter().filter_map(|r| r[j]).collect();
        if !present.is_empty() {
            *mean = present.iter().sum::<f64>() / present.len() as f64;
        }
    }
    means
}

fn column_scales(rows: &[[f64; FEATURE_COUNT]], means: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
    let mut scales = [1.0; FEATURE_COUNT];
    if rows.is_empty() {
        return scales;
    }
    for (j, scale) in scales.iter_mut().enumerate() {
        let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / rows.len() as f64;
        let std = var.sqrt();
        if std > MIN_FEATURE_SCALE {
            *scale = std;
        }
    }
    scales
}

fn impute(row: &[Option<f64>; FEATURE_COUNT], means: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
    let mut out = [0.0; FEATURE_COUNT];
    for j in 0..FEATURE_COUNT {
        out[j] = row[j].unwrap_or(means[j]);
    }
    out
}

fn standardize(row: &[f64; FEATURE_COUNT], means: &[f64; FEATURE_COUNT], scales: &[f64; FEATURE_COUNT]) -> Vector<DIM> {
    let mut z = [0.0; DIM];
    z[0] = 1.0;
    for j in 0..FEATURE_COUNT {
        z[j + 1] = (row[j] - means[j]) / scales[j];
    }
    z
}

fn importance(weights: &[f64; FEATURE_COUNT]) -> BTreeMap<String, f64> {
    let total: f64 = weights.iter().map(|w| w.abs()).sum();
    FEATURE_NAMES
        .iter()
        .zip(weights)
        .map(|(name, w)| {
            let share = if total > 0.0 { w.abs() / total } else { 0.0 };
            (name.to_string(), share)
        })
        .collect()
}
