//! Error types for the acceptance-test harness.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or environment error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input (bad directive, duplicate sweeper, unknown path, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The apply engine rejected or failed to apply a configuration.
    #[error("Apply error: {0}")]
    Apply(String),

    /// A state assertion did not hold.
    #[error("Assertion failed for {address}: {message}")]
    Assertion { address: String, message: String },

    /// Imported state differs from applied state.
    #[error("Import verification failed for {address}:\n{}", .diffs.join("\n"))]
    ImportMismatch { address: String, diffs: Vec<String> },

    /// A lifecycle step failed; wraps the underlying cause.
    #[error("Step {step} failed: {source}")]
    StepFailed {
        step: usize,
        #[source]
        source: Box<Error>,
    },

    /// A resource survived destroy.
    #[error("Destroy check failed: {0}")]
    Destroy(String),

    /// Cloud API error carrying an HTTP-like status code.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Sweeper failure.
    #[error("Sweeper '{name}' failed: {message}")]
    Sweep { name: String, message: String },

    /// Record/replay error.
    #[error("VCR error: {0}")]
    Vcr(String),

    /// A wait condition never became true.
    #[error("Timed out after {elapsed_ms}ms waiting for {what}")]
    Timeout { what: String, elapsed_ms: u64 },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply(message.into())
    }

    pub fn assertion(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Assertion {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn destroy(message: impl Into<String>) -> Self {
        Self::Destroy(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn sweep(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sweep {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn vcr(message: impl Into<String>) -> Self {
        Self::Vcr(message.into())
    }

    pub fn step_failed(step: usize, source: Self) -> Self {
        Self::StepFailed {
            step,
            source: Box::new(source),
        }
    }

    /// Whether this is a 404 from the cloud API.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Innermost cause, looking through `StepFailed` wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
