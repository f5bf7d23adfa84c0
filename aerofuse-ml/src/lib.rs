//! Sensor Calibration for AeroFuse
//!
//! ## Overview
//!
//! Low-cost sensors drift with humidity, temperature and age. This crate
//! learns a per-pollutant correction from windows where a sensor and a
//! satellite reference overlap, and serves it to the fusion engine.
//!
//! ## Why Linear Regression?
//!
//! 1. **Small Data**: a few hundred aligned windows per retrain
//! 2. **Deterministic**: no random initialisation, same input same model
//! 3. **Inspectable**: weights double as feature importance
//! 4. **Portable**: artifacts are a few dozen numbers in a JSON file
//!
//! ## Model
//!
//! ```text
//! features:   raw, temperature, humidity, satellite*, sin(hour), cos(hour), age
//! target:     satellite reference value
//! solver:     ridge normal equations, Cholesky (no matrix crate)
//! evaluation: last 20% of samples held out
//! ```
//! `*` off by default, see [`model::CalibrationConfig`].
//!
//! ## Registry
//!
//! [`ModelRegistry`] keeps every trained version, an atomic active pointer
//! per pollutant and an optional [`store::ArtifactStore`] for durability:
//! ```text
//! train ──▶ fit ──▶ compare on holdout ──▶ persist ──▶ publish (maybe promote)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod features;
pub mod linalg;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod store;

pub use errors::{CalibrationError, CalibrationResult};
pub use features::{CalibrationSample, SensorFeatures};
pub use metrics::ErrorMetrics;
pub use model::{CalibrationConfig, CalibrationParameters, Prediction};
pub use registry::{CalibrationMetrics, ModelRegistry, TrainingLease, TrainingOutcome};
pub use store::{ArtifactStore, JsonFileStore, MemoryStore};
