//! Error reporting helpers.
//!
//! Operations dispatch failures to the registered [`ErrorHandler`]
//! best-effort: the handler runs inline and must never block the calling
//! operation. [`channel_handler`] builds a handler that forwards failures
//! to a bounded channel and drops them when no receiver capacity is
//! available.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ErrorHandler;

/// Build a channel-backed error handler.
///
/// The returned receiver yields the message of every reported failure in
/// dispatch order. When the channel is full the report is dropped rather
/// than blocking the operation that failed.
pub fn channel_handler(capacity: usize) -> (ErrorHandler, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handler: ErrorHandler = Arc::new(move |err| {
        if tx.try_send(err.to_string()).is_err() {
            tracing::debug!("error report dropped, channel at capacity");
        }
    });
    (handler, rx)
}

/// Build an error handler that logs every failure through `tracing`.
pub fn log_handler() -> ErrorHandler {
    Arc::new(|err| tracing::error!("queue operation failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;

    #[tokio::test]
    async fn channel_handler_delivers_reports() {
        let (handler, mut rx) = channel_handler(4);

        handler(&QueueError::NotConfigured);
        handler(&QueueError::Cancelled);

        assert_eq!(rx.recv().await.unwrap(), "Queue session is not configured");
        assert_eq!(rx.recv().await.unwrap(), "Statement cancelled by shutdown");
    }

    #[tokio::test]
    async fn channel_handler_drops_at_capacity_without_blocking() {
        let (handler, mut rx) = channel_handler(1);

        handler(&QueueError::NotConfigured);
        // second report finds the channel full and is dropped; the call
        // returns immediately either way
        handler(&QueueError::Cancelled);

        assert_eq!(rx.recv().await.unwrap(), "Queue session is not configured");
        assert!(rx.try_recv().is_err());
    }
}
