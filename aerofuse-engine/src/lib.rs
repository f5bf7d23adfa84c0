//! AeroFuse Engine
//!
//! ## Overview
//!
//! Ties the fusion core and the calibration registry to upstream data:
//! ```text
//! SensorReadingSource ──┐                         ┌──→ Arc<FusionReport>
//!                       ├──→ FusionEngine ────────┼──→ EventSink (anomalies, runs, models)
//! SatelliteSource ──────┘        │                └──→ ValidationResult history
//!                                └──→ ModelRegistry ←── RetrainScheduler::tick
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use aerofuse_core::{BoundingBox, TimeRange};
//! use aerofuse_engine::{EngineConfig, FusionEngine, MemorySatelliteSource, MemorySensorSource};
//! use chrono::{Duration, Utc};
//!
//! let engine = FusionEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(MemorySensorSource::default()),
//!     Arc::new(MemorySatelliteSource::default()),
//! )?;
//!
//! let region = BoundingBox::new(48.95, 48.80, 2.45, 2.25)?;
//! let range = TimeRange::trailing(Utc::now(), Duration::hours(6))?;
//! let report = engine.fuse(&region, &range)?;
//! println!("{} points, confidence {:.2}", report.points.len(), report.summary_confidence);
//! # Ok::<(), aerofuse_engine::EngineError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod inflight;
pub mod scheduler;
pub mod sources;

pub use config::EngineConfig;
pub use engine::{FusionEngine, TrainingReport};
pub use errors::{EngineError, EngineResult};
pub use scheduler::RetrainScheduler;
pub use sources::{MemorySatelliteSource, MemorySensorSource, SatelliteSource, SensorReadingSource, SourceError};
