//! Error Types for Alignment, Validation and Fusion
//!
//! ## Design Philosophy
//!
//! The fusion core deals with data that is routinely incomplete: sensors sit
//! outside every satellite swath, satellites report a zero column, a window
//! has nobody reporting. None of these are bugs, so the error variants here
//! describe *data conditions* the caller is expected to degrade around:
//!
//! 1. **Small and Copy**: every variant is plain data so results can be
//!    cloned into reports and shared between waiting callers.
//!
//! 2. **Actionable**: each variant carries enough context (budget, elapsed
//!    time, reason) to decide whether to retry, skip or log.
//!
//! ## Error Categories
//!
//! ### Coverage
//! - `NotCovered`: a point falls outside a satellite grid, or in a cell with
//!   no stored value
//!
//! ### Statistics
//! - `UndefinedDeviation`: relative deviation against a zero reference
//!
//! ### Output
//! - `NoContributingSource`: neither a sensor nor a satellite value exists
//!   for a location/time, so no point may be emitted
//! - `RunTimeout`: a fusion run exceeded its time budget
//!
//! ### Input
//! - `InvalidInput`: malformed geometry, empty ranges, non-positive sizes
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use aerofuse_core::{FusionError, validation::relative_deviation};
//!
//! match relative_deviation(40.0, 0.0) {
//!     Ok(deviation) => assert!(deviation >= 0.0),
//!     Err(FusionError::UndefinedDeviation) => {
//!         // Excluded from the anomaly rate, never fatal
//!     }
//!     Err(other) => panic!("unexpected: {other}"),
//! }
//! ```

use thiserror::Error;

/// Result type for core fusion operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Errors raised while aligning, validating and fusing observations
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FusionError {
    /// Point lies outside the satellite grid or in an empty cell
    #[error("Location not covered by satellite grid")]
    NotCovered,

    /// Relative deviation requested against a zero reference value
    #[error("Deviation undefined for zero reference value")]
    UndefinedDeviation,

    /// Neither sensor nor satellite data exists for a location/time
    #[error("No contributing source for location/time")]
    NoContributingSource,

    /// Fusion run stopped because its time budget ran out
    #[error("Run exceeded budget of {budget_ms}ms after {elapsed_ms}ms")]
    RunTimeout {
        /// Configured run budget
        budget_ms: u64,
        /// Time spent when the run was stopped
        elapsed_ms: u64,
    },

    /// Malformed input geometry or time range
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input
        reason: &'static str,
    },
}

impl FusionError {
    /// Whether this error stands for missing data rather than a failure
    pub fn is_data_gap(&self) -> bool {
        matches!(
            self,
            Self::NotCovered | Self::UndefinedDeviation | Self::NoContributingSource
        )
    }
}
