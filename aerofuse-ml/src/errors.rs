//! Calibration lifecycle errors
//!
//! Unlike the data-gap errors of the fusion core, these describe the state
//! of the model registry. They are reported to the caller but never abort a
//! fusion run: without an active model the engine falls back to raw values.

use aerofuse_core::Pollutant;
use thiserror::Error;

/// Result type for calibration operations
pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Errors from training, prediction and artifact storage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Fewer samples than the training minimum
    #[error("Insufficient data to train {pollutant}: need {required}, have {available}")]
    InsufficientData {
        /// Pollutant being trained
        pollutant: Pollutant,
        /// Minimum samples
        required: usize,
        /// Samples provided
        available: usize,
    },

    /// No model for the pollutant, or no such version
    #[error("No calibration model for {pollutant} ({})", describe_version(.version))]
    ModelNotFound {
        /// Pollutant requested
        pollutant: Pollutant,
        /// Version requested; `None` means the active model
        version: Option<u32>,
    },

    /// A training job for the pollutant is already running
    #[error("Training already in progress for {pollutant}")]
    AlreadyTraining {
        /// Pollutant being trained
        pollutant: Pollutant,
    },

    /// Normal equations could not be solved
    #[error("Regression system for {pollutant} is singular")]
    SingularSystem {
        /// Pollutant being trained
        pollutant: Pollutant,
    },

    /// Artifact could not be read or written
    #[error("Artifact storage failed: {0}")]
    Storage(String),
}

fn describe_version(version: &Option<u32>) -> String {
    match version {
        Some(v) => format!("version {v}"),
        None => "no active version".to_string(),
    }
}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_names_version() {
        let err = CalibrationError::ModelNotFound { pollutant: Pollutant::No2, version: Some(7) };
        assert_eq!(err.to_string(), "No calibration model for no2 (version 7)");

        let err = CalibrationError::ModelNotFound { pollutant: Pollutant::No2, version: None };
        assert!(err.to_string().ends_with("(no active version)"));
    }

    #[test]
    fn io_errors_become_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(CalibrationError::from(io), CalibrationError::Storage(_)));
    }
}
