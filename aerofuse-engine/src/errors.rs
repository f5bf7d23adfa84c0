//! Engine-level errors
//!
//! Wraps the fusion and calibration error types so a caller sees one enum.
//! Most data problems never surface here: missing coverage, failed
//! upstream queries and absent models degrade into smaller or
//! lower-confidence reports instead.

use aerofuse_core::FusionError;
use aerofuse_ml::CalibrationError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by [`crate::FusionEngine`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid region, range or grid
    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// Registry or artifact failure
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The run this request joined did not complete
    #[error("Fusion run aborted: {0}")]
    RunAborted(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_message() {
        let err = EngineError::from(FusionError::NoContributingSource);
        assert_eq!(err.to_string(), FusionError::NoContributingSource.to_string());
        assert!(matches!(err, EngineError::Fusion(_)));
    }

    #[test]
    fn json_errors_are_config_errors() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(EngineError::from(err), EngineError::Config(_)));
    }
}
