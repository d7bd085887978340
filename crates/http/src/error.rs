//! Error types for the request pipeline.
//!
//! Recoverability is encoded in the type, not in message strings: callers
//! branch on `is_transient()` or match the variant directly.

use std::time::Duration;

use thiserror::Error;

/// Error from a low-level transport send.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting to the remote host failed.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// The connection was established but I/O timed out.
    #[error("request timed out")]
    Timeout,

    /// Reading or writing the request/response body failed.
    #[error("I/O failure: {message}")]
    Io { message: String },

    /// The request could not be built (bad URL, invalid header).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl TransportError {
    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Malformed requests fail the same way every time; everything else is a
    /// network-condition failure.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidRequest { .. })
    }
}

/// Terminal error from [`crate::executor::RequestExecutor::execute`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Transport-level failure after exhausting the backoff budget.
    #[error("transport failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The caller-supplied deadline was exceeded at a blocking point.
    #[error("deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },
}

impl ExecuteError {
    /// Whether the whole logical call could be retried by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_transient(),
            Self::DeadlineExceeded { .. } => false,
        }
    }
}
