use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::sink::redis_store::SinkPolicy;

const ENV_PREFIX: &str = "RELAY";
const DEFAULT_CHANNEL: &str = "ch";
const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_MAX_DELIVER: i64 = 5;
const DEFAULT_NAK_DELAY_MS: u64 = 1000;

/// One day, keeps every deadline derived from the window representable.
pub const MAX_WINDOW_SECS: u64 = 86_400;
pub const MAX_DRAIN_TIMEOUT_SECS: u64 = 7 * MAX_WINDOW_SECS;
const MAX_NAK_DELAY_MS: u64 = 3_600_000;

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_deliver() -> i64 {
    DEFAULT_MAX_DELIVER
}

fn default_nak_delay_ms() -> u64 {
    DEFAULT_NAK_DELAY_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueueConfig {
    /// `host:port` of the NATS server.
    pub addr: String,
    pub topic: String,
    /// Name of the durable consumer.
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Deliveries of a message before the server gives up on it.
    #[serde(default = "default_max_deliver")]
    pub max_deliver: i64,
    /// Redelivery delay of a message whose write failed.
    #[serde(default = "default_nak_delay_ms")]
    pub nak_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub set: String,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Immutable once loaded, see [Settings::load].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    pub window_secs: u64,
    /// Per-window cap, also the max-in-flight of the queue consumer.
    pub max_per_window: u32,
    /// Defaults to two windows and a second.
    #[serde(default)]
    pub drain_timeout_secs: Option<u64>,
    pub queue: QueueConfig,
    pub sink: SinkConfig,
}

impl Settings {
    /// Reads the optional file (TOML or JSON, by extension) and applies `RELAY_` prefixed
    /// environment overrides on top, `__` separating nested keys (e.g. `RELAY_SINK__HOST`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        info!(?settings, "Loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WINDOW_SECS).contains(&self.window_secs) {
            return Err(Error::Config(format!(
                "window_secs must be between 1 and {MAX_WINDOW_SECS}"
            )));
        }
        if self.max_per_window < 1 {
            return Err(Error::Config(
                "max_per_window must be at least 1".to_string(),
            ));
        }
        if let Some(secs) = self.drain_timeout_secs {
            if !(1..=MAX_DRAIN_TIMEOUT_SECS).contains(&secs) {
                return Err(Error::Config(format!(
                    "drain_timeout_secs must be between 1 and {MAX_DRAIN_TIMEOUT_SECS}"
                )));
            }
        }

        validate_addr(&self.queue.addr)?;
        if self.queue.topic.trim().is_empty() {
            return Err(Error::Config("queue.topic must not be empty".to_string()));
        }
        if self.queue.channel.trim().is_empty() {
            return Err(Error::Config("queue.channel must not be empty".to_string()));
        }
        if self.queue.user.is_some() != self.queue.password.is_some() {
            return Err(Error::Config(
                "queue.user and queue.password must be set together".to_string(),
            ));
        }
        if self.queue.max_deliver < 1 {
            return Err(Error::Config(
                "queue.max_deliver must be at least 1".to_string(),
            ));
        }
        if self.queue.nak_delay_ms > MAX_NAK_DELAY_MS {
            return Err(Error::Config(format!(
                "queue.nak_delay_ms must not exceed {MAX_NAK_DELAY_MS}"
            )));
        }

        if self.sink.host.trim().is_empty() {
            return Err(Error::Config("sink.host must not be empty".to_string()));
        }
        if self.sink.namespace.trim().is_empty() {
            return Err(Error::Config("sink.namespace must not be empty".to_string()));
        }
        if self.sink.connect_timeout_ms == 0 || self.sink.write_timeout_ms == 0 {
            return Err(Error::Config("sink timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.window() * 2 + Duration::from_secs(1))
    }

    pub fn jetstream_config(&self) -> relay_nats::JetstreamConfig {
        let auth = match (&self.queue.user, &self.queue.password, &self.queue.token) {
            (Some(username), Some(password), _) => Some(relay_nats::NatsAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (_, _, Some(token)) => Some(relay_nats::NatsAuth::Token(token.clone())),
            _ => None,
        };
        relay_nats::JetstreamConfig {
            addr: self.queue.addr.clone(),
            topic: self.queue.topic.clone(),
            channel: self.queue.channel.clone(),
            auth,
            max_deliver: self.queue.max_deliver,
            nak_delay: Duration::from_millis(self.queue.nak_delay_ms),
        }
    }

    pub fn sink_policy(&self) -> SinkPolicy {
        SinkPolicy {
            connect_timeout: Duration::from_millis(self.sink.connect_timeout_ms),
            write_timeout: Duration::from_millis(self.sink.write_timeout_ms),
        }
    }
}

fn validate_addr(addr: &str) -> Result<()> {
    let malformed = || Error::Config(format!("queue.addr {addr:?} is not a host:port pair"));
    let (host, port) = addr.rsplit_once(':').ok_or_else(malformed)?;
    if host.trim().is_empty() || port.parse::<u16>().is_err() {
        return Err(malformed());
    }
    Ok(())
}
