//! Broker connection establishment.
//!
//! [`connect`] turns a server URL and retry policy into a [`BrokerChannel`]:
//! one open connection with one open channel on it. Attempts are made at a
//! fixed interval (no backoff, no jitter) and the total number of attempts is
//! `max_retries + 1`.
//!
//! A `BrokerChannel` moves through
//! `Disconnected -> Connecting -> {Connected | Failed}`. Only a `Connected`
//! channel may publish or consume. A channel whose publish timed out is
//! treated as `Failed`: its protocol state is undefined, so it refuses further
//! work and must be closed.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::transport::{Dialer, Session};
use crate::config::BrokerSettings;
use crate::utils::{BrokerError, TransportError, redact_url};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where to connect and how hard to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub url: String,
    pub label: String,
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl ConnectOptions {
    pub fn new(url: &str, label: &str) -> Self {
        Self {
            url: url.to_string(),
            label: label.to_string(),
            max_retries: 0,
            retry_interval: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_interval = retry_interval;
        self
    }

    /// Builds options from broker settings. Fails with
    /// [`BrokerError::Disabled`] when no URL is configured.
    pub fn from_settings(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let url = settings.url.as_deref().ok_or(BrokerError::Disabled)?;
        Ok(Self::new(url, &settings.channel_label).with_retries(
            settings.max_retries,
            Duration::from_secs(settings.retry_interval_secs),
        ))
    }

    /// Total dial attempts this policy allows.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn validate(&self) -> Result<(), BrokerError> {
        if self.url.trim().is_empty() {
            return Err(BrokerError::InvalidOptions(
                "server url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// An open connection and its channel, owned by a single operation.
pub struct BrokerChannel {
    label: String,
    url: String,
    session: Box<dyn Session>,
    poisoned: bool,
}

impl fmt::Debug for BrokerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerChannel")
            .field("label", &self.label)
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}

impl BrokerChannel {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Redacted server URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        if self.poisoned {
            ConnectionState::Failed
        } else if self.session.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Declares `queue` on the broker. Only used when the gateway is
    /// configured to own its queue.
    pub async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        self.session
            .declare_queue(queue)
            .await
            .map_err(|source| BrokerError::Subscription {
                queue: queue.to_string(),
                source,
            })?;
        info!(queue, label = %self.label, "queue declared");
        Ok(())
    }

    /// Closes the channel and then the connection.
    ///
    /// Must run on every exit path of the owning operation. Errors are logged
    /// and swallowed: there is nothing left for the caller to do with them.
    pub async fn close(self) {
        match self.session.close().await {
            Ok(()) => debug!(label = %self.label, "broker channel closed"),
            Err(e) => warn!(label = %self.label, error = %e, "error while closing broker channel"),
        }
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    pub(crate) fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }
}

/// Dials `options.url` until a channel opens or the retry budget is spent.
///
/// Makes at most `options.max_retries + 1` attempts, sleeping
/// `options.retry_interval` between consecutive attempts. On exhaustion the
/// last underlying error is returned inside [`BrokerError::Connection`].
pub async fn connect(
    dialer: &dyn Dialer,
    options: &ConnectOptions,
) -> Result<BrokerChannel, BrokerError> {
    options.validate()?;

    let url = redact_url(&options.url);
    let attempts = options.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(%url, attempt, attempts, state = %ConnectionState::Connecting, "dialing broker");

        let err: TransportError = match dialer.dial(&options.url, &options.label).await {
            Ok(session) => {
                info!(%url, label = %options.label, attempt, "connected to broker");
                return Ok(BrokerChannel {
                    label: options.label.clone(),
                    url,
                    session,
                    poisoned: false,
                });
            }
            Err(e) => e,
        };

        if attempt >= attempts {
            warn!(%url, attempts, error = %err, state = %ConnectionState::Failed, "giving up on broker");
            return Err(BrokerError::Connection {
                url,
                attempts,
                source: err,
            });
        }

        warn!(
            %url,
            attempt,
            attempts,
            error = %err,
            retry_in = ?options.retry_interval,
            "broker connection failed, retrying"
        );
        tokio::time::sleep(options.retry_interval).await;
    }
}
