//! The `error` module defines the error types used within the `confgate`
//! application.
//!
//! Two layers exist:
//! - [`TransportError`] is what a concrete broker client reports for a single
//!   operation (one dial, one publish, one consume setup).
//! - [`BrokerError`] is what the connection, publisher and consumer layers
//!   return to callers. It carries enough context (URL, attempts, routing key,
//!   queue) for the HTTP gateway to pick a status code and for logs to be
//!   useful on their own.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`Dialer`](crate::broker::transport::Dialer) or a
/// [`Session`](crate::broker::transport::Session).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    #[error("channel closed")]
    Closed,

    #[error("unsupported broker url scheme: {0}")]
    UnsupportedScheme(String),
}

/// Errors surfaced by the broker core.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid broker options: {0}")]
    InvalidOptions(String),

    /// Dialing or opening a channel failed on every attempt.
    #[error("failed to connect to {url} after {attempts} attempt(s): {source}")]
    Connection {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("publish to '{routing_key}' timed out after {timeout:?}")]
    PublishTimeout {
        routing_key: String,
        timeout: Duration,
    },

    #[error("publish to '{routing_key}' failed: {source}")]
    PublishRejected {
        routing_key: String,
        #[source]
        source: TransportError,
    },

    #[error("subscription to '{queue}' failed: {source}")]
    Subscription {
        queue: String,
        #[source]
        source: TransportError,
    },

    #[error("broker channel is not connected")]
    NotConnected,

    #[error("broker interaction is disabled (no broker url configured)")]
    Disabled,
}
