//! Queue subscription as a stream of messages.
//!
//! Consumers are auto-acknowledged, non-exclusive and take no arguments:
//! delivery is at-most-once and a crash between receipt and processing loses
//! the message. There is no ack/nack path.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures_util::StreamExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::broker::connection::BrokerChannel;
use crate::broker::message::Message;
use crate::broker::transport::DeliveryStream;
use crate::utils::BrokerError;

/// Messages from one queue, in broker order.
///
/// The stream is infinite while the channel stays open and cannot be
/// restarted once it ends; a fresh connect and subscribe is needed. A broker
/// error after setup is logged once and ends the stream, after everything
/// already buffered has been yielded.
pub struct Subscription {
    queue: String,
    consumer_tag: String,
    inner: DeliveryStream,
    finished: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("queue", &self.queue)
            .field("consumer_tag", &self.consumer_tag)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(msg))) => Poll::Ready(Some(msg)),
            Poll::Ready(Some(Err(e))) => {
                error!(queue = %self.queue, error = %e, "subscription ended by broker");
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                info!(queue = %self.queue, "subscription closed");
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Starts consuming `queue` on `channel`.
///
/// Fails with [`BrokerError::Subscription`] when the consumer cannot be set
/// up (for example the queue does not exist); no stream is produced then.
/// The returned stream does not borrow `channel`, so the owner can close the
/// channel to end it.
pub async fn subscribe(channel: &BrokerChannel, queue: &str) -> Result<Subscription, BrokerError> {
    channel.ensure_connected()?;

    let consumer_tag = format!("{}-{}", channel.label(), Uuid::new_v4());
    let inner = channel
        .session()
        .consume(queue, &consumer_tag)
        .await
        .map_err(|source| {
            error!(queue, error = %source, "failed to subscribe");
            BrokerError::Subscription {
                queue: queue.to_string(),
                source,
            }
        })?;

    info!(queue, consumer_tag = %consumer_tag, "subscribed, waiting for messages");
    Ok(Subscription {
        queue: queue.to_string(),
        consumer_tag,
        inner,
        finished: false,
    })
}

/// Logs every message of `subscription` until it ends, returning how many
/// were received.
pub async fn drain(mut subscription: Subscription) -> usize {
    let mut received = 0;
    while let Some(msg) = subscription.next().await {
        received += 1;
        info!(
            queue = %subscription.queue,
            routing_key = %msg.routing_key,
            content_type = %msg.content_type,
            body = %msg.body_text(),
            "received message"
        );
    }
    received
}
