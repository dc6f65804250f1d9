//! Error types for replay-throttle.

use thiserror::Error;

use crate::ratelimit::Operation;

/// Main error type for rate limiting operations.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Constraint parameters are inconsistent or out of range
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfiguration(String),

    /// The operation is not part of the configured tier
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// A cancellable wait was abandoned before the call could fire
    #[error("Wait for {0} was cancelled")]
    Cancelled(Operation),

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for replay-throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
