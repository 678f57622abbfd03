//! Single-message publish with a deadline.

use std::time::Duration;

use tracing::{info, warn};

use crate::broker::connection::BrokerChannel;
use crate::broker::message::Message;
use crate::utils::BrokerError;

/// Default publish deadline.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes `body` as `application/json` to the default exchange with
/// `routing_key`, giving up after `timeout`.
pub async fn publish(
    channel: &mut BrokerChannel,
    routing_key: &str,
    body: Vec<u8>,
    timeout: Duration,
) -> Result<(), BrokerError> {
    publish_message(channel, Message::json(routing_key, body), timeout).await
}

/// Publishes `message` fire-and-forget: the broker is not asked to confirm
/// and unroutable messages are dropped broker-side.
///
/// The channel is taken `&mut` so only one publish can be in flight on it.
/// When the deadline fires the in-flight publish is abandoned and the channel
/// is marked failed; the caller must close it rather than reuse it.
pub async fn publish_message(
    channel: &mut BrokerChannel,
    message: Message,
    timeout: Duration,
) -> Result<(), BrokerError> {
    if timeout.is_zero() {
        return Err(BrokerError::InvalidOptions(
            "publish timeout must be greater than zero".to_string(),
        ));
    }
    channel.ensure_connected()?;

    let routing_key = message.routing_key.clone();
    let outcome = tokio::time::timeout(timeout, channel.session().publish(&message)).await;

    match outcome {
        Ok(Ok(())) => {
            info!(
                routing_key = %routing_key,
                bytes = message.body.len(),
                body = %message.body_text(),
                "sent"
            );
            Ok(())
        }
        Ok(Err(source)) => {
            warn!(routing_key = %routing_key, error = %source, "publish rejected");
            Err(BrokerError::PublishRejected {
                routing_key,
                source,
            })
        }
        Err(_elapsed) => {
            channel.poison();
            warn!(routing_key = %routing_key, ?timeout, "publish timed out");
            Err(BrokerError::PublishTimeout {
                routing_key,
                timeout,
            })
        }
    }
}
