//! Error types for the header transport.
//!
//! None of these reach the host application. [`crate::RequestContext`]
//! resolves each of them into the deferral latch or the memory sentinel so
//! that the instrumented request is never failed by its own logger.

use thiserror::Error;

/// Internal failure kinds of the logging pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ChromeLoggerError {
    /// Process memory is above the configured ceiling.
    #[error("memory usage {usage} exceeds limit {limit}")]
    MemoryLimitExceeded {
        /// Reported usage in bytes
        usage: u64,
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// The encoded header would not fit the configured budget.
    #[error("encoded header is {size} bytes, limit is {limit}")]
    HeaderTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Configured budget in bytes
        limit: i64,
    },

    /// The response already went out, headers can no longer change.
    #[error("response headers already sent")]
    HeadersAlreadySent,

    /// The payload could not be serialized.
    #[error("failed to encode header payload: {0}")]
    Encoding(String),

    /// The encoded payload is not a legal header value.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(String),
}

impl From<serde_json::Error> for ChromeLoggerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for ChromeLoggerError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeaderValue(err.to_string())
    }
}

/// Result type for transport operations
pub type ChromeLoggerResult<T> = Result<T, ChromeLoggerError>;
