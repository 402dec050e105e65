//! Error types for tableq operations.

use std::sync::Arc;
use thiserror::Error;

/// Result type used throughout tableq.
pub type QueueResult<T> = Result<T, QueueError>;

/// Callback invoked with every operational failure.
///
/// Handlers are called inline from the failing operation and must not
/// block; use [`crate::reporter::channel_handler`] for a handler that
/// hands failures off to a channel without ever blocking the caller.
pub type ErrorHandler = Arc<dyn Fn(&QueueError) + Send + Sync>;

/// Main error type for tableq operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Configuration rejected by validation
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// The session is already running; configuration is frozen
    #[error("Queue session is already started")]
    AlreadyStarted,

    /// Initialize was called before configure
    #[error("Queue session is not configured")]
    NotConfigured,

    /// A data operation was issued before initialize (or after shutdown)
    #[error("Queue session is not running")]
    NotRunning,

    /// An item has no binary representation
    #[error("Unsupported payload type '{type_name}'")]
    UnsupportedPayload {
        /// Concrete type of the rejected item
        type_name: String,
        /// Underlying encoder error, if the encoder reported one
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Opening the connection or the initial liveness probe failed
    #[error("Connection error: {message}")]
    Connection {
        /// Error message
        message: String,
        /// Underlying driver error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A query or exec statement failed
    #[error("Statement failed: {0}")]
    Statement(#[from] sqlx::Error),

    /// A returned row could not be decoded
    #[error("Row decode failed: {0}")]
    Scan(#[source] sqlx::Error),

    /// The per-operation deadline elapsed before the statement finished
    #[error("Statement timed out after {timeout_secs} seconds")]
    Timeout {
        /// Configured per-operation timeout in seconds
        timeout_secs: i64,
    },

    /// The statement was cancelled by session shutdown
    #[error("Statement cancelled by shutdown")]
    Cancelled,
}

impl QueueError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error with an underlying cause.
    pub fn connection<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unsupported-payload error for the given concrete type.
    pub fn unsupported(
        type_name: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::UnsupportedPayload {
            type_name: type_name.into(),
            source,
        }
    }
}
