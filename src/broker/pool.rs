//! Long-lived broker channel shared by request handlers.
//!
//! Opening a connection per request storms the broker under load. Instead,
//! [`SharedChannel`] keeps one [`BrokerChannel`] behind an async mutex and
//! hands it to one operation at a time. The channel is opened lazily, reused
//! while it stays connected, and discarded after any publish failure so the
//! next caller reconnects.
//!
//! Callers that queued up behind a connect which then failed get that failure
//! back immediately instead of running their own retry loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broker::connection::{BrokerChannel, ConnectOptions, connect};
use crate::broker::publisher;
use crate::broker::transport::Dialer;
use crate::utils::{BrokerError, TransportError};

/// Summary of the most recent failed connect, replayed to waiting callers.
#[derive(Debug, Clone)]
struct ConnectFailure {
    url: String,
    attempts: u32,
    reason: String,
}

impl ConnectFailure {
    fn to_error(&self) -> BrokerError {
        BrokerError::Connection {
            url: self.url.clone(),
            attempts: self.attempts,
            source: TransportError::Unreachable(self.reason.clone()),
        }
    }
}

#[derive(Default)]
struct Slot {
    channel: Option<BrokerChannel>,
    last_failure: Option<ConnectFailure>,
}

/// Owns the channel while one publish runs. If the publish future is dropped
/// before it finishes, the channel is closed in the background and never
/// returns to the slot.
struct InFlight {
    channel: Option<BrokerChannel>,
}

impl InFlight {
    async fn publish(
        &mut self,
        routing_key: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        let channel = self.channel.as_mut().ok_or(BrokerError::NotConnected)?;
        publisher::publish(channel, routing_key, body, timeout).await
    }

    fn finish(mut self) -> Option<BrokerChannel> {
        self.channel.take()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        warn!(label = %channel.label(), "publish abandoned, discarding broker channel");
        channel.poison();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(channel.close());
            }
            Err(_) => debug!("no runtime to close abandoned broker channel"),
        }
    }
}

pub struct SharedChannel {
    dialer: Arc<dyn Dialer>,
    options: ConnectOptions,
    declare: Option<String>,
    slot: Mutex<Slot>,
    connect_failures: AtomicU64,
}

impl SharedChannel {
    pub fn new(dialer: Arc<dyn Dialer>, options: ConnectOptions) -> Self {
        Self {
            dialer,
            options,
            declare: None,
            slot: Mutex::new(Slot::default()),
            connect_failures: AtomicU64::new(0),
        }
    }

    /// Declare `queue` every time a new channel is opened.
    pub fn declaring(mut self, queue: &str) -> Self {
        self.declare = Some(queue.to_string());
        self
    }

    /// Whether a connected channel is currently held.
    pub async fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .await
            .channel
            .as_ref()
            .is_some_and(BrokerChannel::is_connected)
    }

    /// Publishes `body` to `routing_key`, connecting first if needed.
    ///
    /// Calls are serialized: the lock is held for the connect (including its
    /// retries) and the publish. A caller that waited on the lock while
    /// another caller's connect failed returns that failure without dialing.
    pub async fn publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        let failures_seen = self.connect_failures.load(Ordering::SeqCst);
        let mut slot = self.slot.lock().await;

        let channel = match slot.channel.take() {
            Some(channel) if channel.is_connected() => channel,
            stale => {
                if let Some(stale) = stale {
                    debug!(state = %stale.state(), "discarding stale broker channel");
                    stale.close().await;
                }
                if self.connect_failures.load(Ordering::SeqCst) != failures_seen {
                    if let Some(failure) = &slot.last_failure {
                        debug!(url = %failure.url, "connect failed while waiting, not redialing");
                        return Err(failure.to_error());
                    }
                }
                match self.open().await {
                    Ok(channel) => {
                        slot.last_failure = None;
                        channel
                    }
                    Err(e) => {
                        if let BrokerError::Connection {
                            url,
                            attempts,
                            source,
                        } = &e
                        {
                            slot.last_failure = Some(ConnectFailure {
                                url: url.clone(),
                                attempts: *attempts,
                                reason: source.to_string(),
                            });
                            self.connect_failures.fetch_add(1, Ordering::SeqCst);
                        }
                        return Err(e);
                    }
                }
            }
        };

        let mut in_flight = InFlight {
            channel: Some(channel),
        };
        let result = in_flight.publish(routing_key, body, timeout).await;
        let channel = in_flight.finish();

        match (&result, channel) {
            (Ok(()), channel) => slot.channel = channel,
            (Err(_), Some(failed)) => {
                warn!("closing broker channel after failed publish");
                failed.close().await;
            }
            (Err(_), None) => {}
        }
        result
    }

    /// Closes the held channel, if any. A later publish reconnects.
    pub async fn close(&self) {
        if let Some(channel) = self.slot.lock().await.channel.take() {
            info!(label = %channel.label(), "closing shared broker channel");
            channel.close().await;
        }
    }

    async fn open(&self) -> Result<BrokerChannel, BrokerError> {
        let channel = connect(self.dialer.as_ref(), &self.options).await?;
        if let Some(queue) = &self.declare {
            if let Err(e) = channel.declare_queue(queue).await {
                channel.close().await;
                return Err(e);
            }
        }
        Ok(channel)
    }
}
