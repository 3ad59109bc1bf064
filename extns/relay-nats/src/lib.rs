use std::time::Duration;

use async_nats::ConnectOptions;
use async_nats::jetstream::{self, stream};

/// Durable pull consumer which hands out deliveries that must be acked or nak'ed.
pub mod consumer;

/// Publisher used by the demo producer.
pub mod producer;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("Connecting to NATS {server} - {error}")]
    Connection { server: String, error: String },

    #[error("Subscribing to JetStream {stream} - {consumer} - {error}")]
    Subscription {
        stream: String,
        consumer: String,
        error: String,
    },

    #[error("Jetstream - {0}")]
    Jetstream(String),

    #[error("Publish - {0}")]
    Publish(String),

    #[error("{0}")]
    Other(String),
}

/// Represents the authentication method used to connect to NATS.
#[derive(Debug, Clone, PartialEq)]
pub enum NatsAuth {
    Basic { username: String, password: String },
    Token(String),
}

/// Where and what to consume/publish. The topic is used both as the stream name and as its only
/// subject, the channel is the durable consumer name.
#[derive(Debug, Clone, PartialEq)]
pub struct JetstreamConfig {
    pub addr: String,
    pub topic: String,
    pub channel: String,
    /// Deliveries of one message before the server gives up on it.
    pub max_deliver: i64,
    /// How long a nak'ed message waits before it is redelivered.
    pub nak_delay: Duration,
    pub auth: Option<NatsAuth>,
}

/// Connects to the NATS server. Unlike the reconnect policy after a successful connect, the
/// initial connect is not retried so that an unreachable server surfaces as an error.
pub(crate) async fn connect(config: &JetstreamConfig) -> Result<async_nats::Client> {
    let mut conn_opts = ConnectOptions::new()
        .max_reconnects(None) // unlimited reconnects
        .reconnect_delay_callback(|attempts| {
            Duration::from_millis(std::cmp::min((attempts * 10) as u64, 1000))
        })
        .ping_interval(Duration::from_secs(3));

    if let Some(auth) = config.auth.clone() {
        conn_opts = match auth {
            NatsAuth::Basic { username, password } => {
                conn_opts.user_and_password(username, password)
            }
            NatsAuth::Token(token) => conn_opts.token(token),
        };
    }

    async_nats::connect_with_options(&config.addr, conn_opts)
        .await
        .map_err(|err| Error::Connection {
            server: config.addr.to_string(),
            error: err.to_string(),
        })
}

/// Returns the stream backing the topic, creating it if it does not exist yet.
pub(crate) async fn get_or_create_stream(
    context: &jetstream::Context,
    topic: &str,
) -> Result<stream::Stream> {
    context
        .get_or_create_stream(stream::Config {
            name: topic.to_string(),
            subjects: vec![topic.to_string()],
            ..Default::default()
        })
        .await
        .map_err(|e| Error::Jetstream(format!("Creating stream {topic}: {e}")))
}
