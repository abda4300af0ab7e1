//! Error types for fractalwire.

use thiserror::Error;

use crate::connection::Rejected;

/// Main error type for all fractalwire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error reported by the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (report lines only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid length prefix, oversized declared length or truncated field.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Payload does not match the message expected in the current protocol phase.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Job parameters rejected at construction.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Server endpoint string is not `address:port`.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A tile could not be merged into the canvas.
    #[error("Stitch error: {0}")]
    Stitch(String),

    /// Tile compute did not produce a result.
    #[error("Compute error: {0}")]
    Compute(String),

    /// Every session is gone but work items are still waiting.
    #[error("All sessions disconnected with {remaining} work item(s) left")]
    WorkRecoveryExhausted {
        /// Number of items that were never merged.
        remaining: usize,
    },

    /// The connection refused an operation.
    #[error("Operation rejected: {0}")]
    Rejected(Rejected),

    /// The connection is closing or closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<Rejected> for Error {
    fn from(rejected: Rejected) -> Self {
        match rejected {
            Rejected::Closing => Error::ConnectionClosed,
            other => Error::Rejected(other),
        }
    }
}

impl Error {
    /// Whether this error always terminates the connection it occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::Framing(_) | Error::Decode(_))
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
