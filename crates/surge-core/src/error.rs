//! Error types for the load generation engine.

use thiserror::Error;

/// Result type alias using SurgeError.
pub type SurgeResult<T> = Result<T, SurgeError>;

/// Errors that prevent a run from starting.
///
/// Nothing that happens once workers are running is fatal; per-request
/// failures travel to the aggregator as events instead.
#[derive(Debug, Error)]
pub enum SurgeError {
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid template '{id}': {message}")]
    InvalidTemplate { id: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Histogram error: {0}")]
    Histogram(String),
}

/// Returned by a setup hook that refuses to build a request.
///
/// The worker restarts its scenario at the first template and sends nothing.
#[derive(Debug, Clone, Error)]
#[error("Request setup failed: {message}")]
pub struct SetupError {
    pub message: String,
}

impl SetupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Classification of a failed network attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Other,
}

/// Connection or timeout failure during a network call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a [`reqwest::Error`] by its failure cause.
    pub fn classify(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}
