//! Message-broker connection and transport layer.
//!
//! - `connection`: dial-with-retry producing a [`BrokerChannel`]
//! - `publisher`: one message, one deadline
//! - `consumer`: a queue as a stream of messages
//! - `pool`: the long-lived [`SharedChannel`] used by the HTTP gateway
//! - `transport`: the [`Dialer`]/[`Session`] seam, with `amqp` (lapin) and
//!   `memory` (in-process) implementations

pub mod amqp;
pub mod connection;
pub mod consumer;
pub mod memory;
pub mod message;
pub mod pool;
pub mod publisher;
pub mod transport;

use std::sync::Arc;

pub use connection::{BrokerChannel, ConnectOptions, ConnectionState, connect};
pub use consumer::{Subscription, drain, subscribe};
pub use memory::MemoryBroker;
pub use message::Message;
pub use pool::SharedChannel;
pub use publisher::publish;
pub use transport::{Dialer, Session};

use crate::utils::TransportError;

/// Picks the transport for `url` by scheme.
///
/// `amqp://` and `amqps://` go through lapin. `memory://` uses `memory`,
/// which must be supplied by the caller so that publishers and consumers in
/// one process share the same in-process broker.
pub fn dialer_for(url: &str, memory: &MemoryBroker) -> Result<Arc<dyn Dialer>, TransportError> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme).unwrap_or("");
    match scheme.to_ascii_lowercase().as_str() {
        "amqp" | "amqps" => Ok(Arc::new(amqp::AmqpDialer)),
        "memory" => Ok(Arc::new(memory.clone())),
        _ => Err(TransportError::UnsupportedScheme(scheme.to_string())),
    }
}
