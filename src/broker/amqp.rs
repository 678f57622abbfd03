//! AMQP 0.9.1 transport backed by `lapin`.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{FieldTable, LongString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, warn};

use crate::broker::message::Message;
use crate::broker::transport::{DeliveryStream, Dialer, Session};
use crate::utils::TransportError;

const REPLY_SUCCESS: u16 = 200;

#[derive(Debug, Default, Clone, Copy)]
pub struct AmqpDialer;

#[async_trait]
impl Dialer for AmqpDialer {
    async fn dial(&self, url: &str, label: &str) -> Result<Box<dyn Session>, TransportError> {
        let properties =
            ConnectionProperties::default().with_connection_name(LongString::from(label.to_string()));
        let connection = Connection::connect(url, properties).await?;

        // A connection without a channel is useless to every caller.
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "channel open failed").await {
                    warn!(error = %close_err, "failed to close half-open connection");
                }
                return Err(e.into());
            }
        };

        debug!(channel_id = channel.id(), label, "amqp channel opened");
        Ok(Box::new(AmqpSession {
            connection,
            channel,
        }))
    }
}

pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl Session for AmqpSession {
    async fn publish(&self, message: &Message) -> Result<(), TransportError> {
        let properties = BasicProperties::default()
            .with_content_type(message.content_type.clone().into())
            .with_timestamp(u64::try_from(message.timestamp).unwrap_or(0));

        self.channel
            .basic_publish(
                "",
                &message.routing_key,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &message.body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, TransportError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| match e {
                lapin::Error::ProtocolError(ref amqp) if amqp.get_id() == 404 => {
                    TransportError::QueueNotFound(queue.to_string())
                }
                other => TransportError::Amqp(other),
            })?;

        let deliveries = consumer.map(|delivery| {
            delivery
                .map(delivery_to_message)
                .map_err(TransportError::from)
        });
        Ok(deliveries.boxed())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.channel.status().connected() {
            self.channel.close(REPLY_SUCCESS, "closing").await?;
        }
        if self.connection.status().connected() {
            self.connection.close(REPLY_SUCCESS, "closing").await?;
        }
        Ok(())
    }
}

fn delivery_to_message(delivery: Delivery) -> Message {
    let content_type = delivery
        .properties
        .content_type()
        .as_ref()
        .map(|ct| ct.as_str().to_string())
        .unwrap_or_default();
    let timestamp = match delivery.properties.timestamp() {
        Some(ts) => i64::try_from(*ts).unwrap_or(i64::MAX),
        None => 0,
    };

    Message {
        routing_key: delivery.routing_key.as_str().to_string(),
        content_type,
        body: delivery.data,
        timestamp,
    }
}
