use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, Client, RedisError, RedisResult};

use crate::error::{Error, Result};
use crate::sink::{Connector, Field, KvConnection, SinkKey};

const HSET: &str = "HSET";

/// Timeouts applied to every connection created by the [RedisConnector].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkPolicy {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

#[derive(Clone)]
pub struct RedisConnector {
    client: Client,
    addr: String,
    policy: SinkPolicy,
}

impl RedisConnector {
    /// Does not connect, see [Connector::connect].
    pub fn new(host: &str, port: u16, policy: SinkPolicy) -> Result<Self> {
        let addr = format!("redis://{host}:{port}/");
        let client = Client::open(addr.as_str())
            .map_err(|e| Error::Sink(format!("Creating Redis client for {addr}: {e:?}")))?;
        Ok(Self {
            client,
            addr,
            policy,
        })
    }
}

impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection> {
        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(self.policy.connect_timeout)
            .set_response_timeout(self.policy.write_timeout);

        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| Error::Sink(format!("Connecting to Redis server {}: {e:?}", self.addr)))?;

        Ok(RedisConnection { conn: Some(conn) })
    }
}

pub struct RedisConnection {
    conn: Option<MultiplexedConnection>,
}

// Errors after which the multiplexed connection cannot be trusted anymore. Anything else (e.g.
// WRONGTYPE) is a per-command failure and keeps the connection.
fn is_transport_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

impl KvConnection for RedisConnection {
    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn put(&mut self, key: &SinkKey, fields: &[Field]) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::Sink("Redis connection is closed".to_string()));
        };

        let mut cmd = redis::cmd(HSET);
        cmd.arg(key.to_string());
        for field in fields {
            cmd.arg(&field.name).arg(&field.value);
        }

        let result: RedisResult<()> = cmd.query_async(conn).await;
        result.map_err(|e| {
            if is_transport_error(&e) {
                self.conn = None;
            }
            Error::SinkWrite(format!("Writing {key} to Redis: {e:?}"))
        })
    }

    async fn close(&mut self) {
        // the multiplexed connection shuts down once its last handle is dropped
        self.conn = None;
    }
}
