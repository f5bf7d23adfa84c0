//! Core fusion engine for AeroFuse
//!
//! Reconciles low-cost ground sensors with satellite and atmospheric-model
//! grids: aligns them in space and time, checks each sensor against the
//! reference, and blends both into confidence-scored air-quality estimates.
//!
//! Pipeline stages, leaves first:
//! - [`spatial`]: point → satellite grid cell
//! - [`temporal`]: readings and observations → common windows and pairs
//! - [`validation`]: pairs → agreement statistics, verdicts, anomaly signals
//! - [`fusion`]: calibrated sensors + satellite → fused points
//! - [`aqi`]: concentrations → index and category
//!
//! ```no_run
//! use aerofuse_core::{
//!     fusion::{FusionAggregator, FusionSite, SatelliteContribution},
//!     GeoPoint, Pollutant, QualityFlag,
//! };
//! use chrono::Utc;
//!
//! let aggregator = FusionAggregator::default();
//! let site = FusionSite {
//!     pollutant: Pollutant::Pm25,
//!     timestamp: Utc::now(),
//!     location: GeoPoint::new(48.85, 2.35),
//!     cell: None,
//! };
//! let satellite = SatelliteContribution {
//!     source: "cams_pm25".into(),
//!     value: 18.0,
//!     uncertainty: 2.5,
//!     quality: QualityFlag::Good,
//! };
//!
//! // Gap fill: satellite only
//! let point = aggregator.fuse(site, &[], Some(&satellite)).unwrap();
//! assert!(point.confidence.as_float() <= 0.5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod aqi;
pub mod constants;
pub mod errors;
pub mod events;
pub mod fusion;
pub mod model;
pub mod spatial;
pub mod temporal;
pub mod time;
pub mod validation;

// Public API
pub use aqi::{AqiCategory, AqiReading, BreakpointTable};
pub use errors::{FusionError, FusionResult};
pub use events::{EngineEvent, EventSink};
pub use fusion::{ConfidenceScore, FusedDataPoint, FusionAggregator, FusionReport, RunStatus};
pub use model::{
    BoundingBox, CellValue, GeoPoint, Pollutant, QualityFlag, SatelliteObservation, SensorReading, TimeRange,
};
pub use spatial::{CellId, GridIndex};
pub use temporal::{Alignment, Resolution, TemporalAligner};
pub use time::{Clock, ManualClock, SystemClock};
pub use validation::{AnomalySignal, CrossValidator, HealthTracker, ValidationResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
