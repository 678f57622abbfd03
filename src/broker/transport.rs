//! Broker client seam.
//!
//! The connection, publisher and consumer layers never talk to a concrete
//! client library directly. They go through [`Dialer`] (produce an open
//! session) and [`Session`] (one connection plus one channel). `amqp`
//! implements these on top of lapin, `memory` implements them in-process.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::broker::message::Message;
use crate::utils::TransportError;

/// Inbound deliveries of one consumer, in broker order.
///
/// The stream ends (`None`) when the channel or connection closes. An `Err`
/// item means the broker tore the channel down abnormally.
pub type DeliveryStream = BoxStream<'static, Result<Message, TransportError>>;

#[async_trait]
pub trait Dialer: Send + Sync {
    /// Make one attempt to connect to `url` and open a channel on it.
    ///
    /// `label` names the connection on the broker side. Implementations must
    /// not retry; retry policy belongs to the caller.
    async fn dial(&self, url: &str, label: &str) -> Result<Box<dyn Session>, TransportError>;
}

/// A connected broker connection with exactly one open channel.
///
/// A session is not meant to be shared between concurrent operations.
#[async_trait]
pub trait Session: Send + Sync {
    /// Publish to the default exchange with `message.routing_key`.
    ///
    /// Fire-and-forget: mandatory and immediate are off and no publisher
    /// confirm is awaited beyond the client accepting the frame.
    async fn publish(&self, message: &Message) -> Result<(), TransportError>;

    /// Start an auto-acknowledged, non-exclusive consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str)
    -> Result<DeliveryStream, TransportError>;

    /// Declare `queue` (non-durable, non-exclusive, no auto-delete).
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Both the connection and its channel are open.
    fn is_connected(&self) -> bool;

    /// Close the channel, then the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<(), TransportError>;
}
