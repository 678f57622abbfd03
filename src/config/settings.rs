use serde::Deserialize;

use crate::broker::publisher::DEFAULT_PUBLISH_TIMEOUT;

/// Top-level configuration settings for the application.
///
/// Includes settings for the HTTP server, the broker connection and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the HTTP gateway will bind to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker.
///
/// A missing `url` disables broker interaction instead of failing startup.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub url: Option<String>,
    pub channel_label: String,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub publish_timeout_secs: u64,
    pub config_queue: String,
    pub declare_queue: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub channel_label: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_interval_secs: Option<u64>,
    pub publish_timeout_secs: Option<u64>,
    pub config_queue: Option<String>,
    pub declare_queue: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                url: None,
                channel_label: "wingnut".to_string(),
                max_retries: 5,
                retry_interval_secs: 5,
                publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT.as_secs(),
                config_queue: "config".to_string(),
                declare_queue: false,
            },
            log: LogSettings {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every value missing from `partial` with the default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.unwrap_or_default();
        let broker = partial.broker.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                url: broker
                    .url
                    .filter(|u| !u.trim().is_empty())
                    .or(default.broker.url),
                channel_label: broker
                    .channel_label
                    .unwrap_or(default.broker.channel_label),
                max_retries: broker.max_retries.unwrap_or(default.broker.max_retries),
                retry_interval_secs: broker
                    .retry_interval_secs
                    .unwrap_or(default.broker.retry_interval_secs),
                publish_timeout_secs: broker
                    .publish_timeout_secs
                    .unwrap_or(default.broker.publish_timeout_secs),
                config_queue: broker.config_queue.unwrap_or(default.broker.config_queue),
                declare_queue: broker.declare_queue.unwrap_or(default.broker.declare_queue),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
                format: log.format.unwrap_or(default.log.format),
            },
        }
    }

    /// Rejects values the broker layer cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.broker.publish_timeout_secs == 0 {
            return Err("broker.publish_timeout_secs must be greater than zero".to_string());
        }
        if self.broker.channel_label.trim().is_empty() {
            return Err("broker.channel_label must not be empty".to_string());
        }
        if self.broker.config_queue.trim().is_empty() {
            return Err("broker.config_queue must not be empty".to_string());
        }
        Ok(())
    }
}
