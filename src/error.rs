use thiserror::Error;

/// Suspension analyzer error types
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Calibration window closed before enough stationary samples arrived.
    #[error("Insufficient calibration samples: collected {collected} of {required}")]
    InsufficientSamples { collected: usize, required: usize },

    #[error("Invalid analyzer state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown test protocol: {0}")]
    UnknownProtocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

impl AnalyzerError {
    /// Whether the caller can retry or proceed after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalyzerError::InsufficientSamples { .. } | AnalyzerError::InvalidState(_)
        )
    }
}
