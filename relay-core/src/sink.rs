//! [SinkConnection] serializes every write to the key-value store through one lazily established
//! connection. A write makes at most one connect attempt; a connection which failed at the
//! transport level reports itself as disconnected so that the next write reconnects from scratch.

use std::fmt;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Redis backed implementation of the store.
pub mod redis_store;

/// Address of a record in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkKey {
    pub namespace: String,
    pub set: String,
    pub key: i64,
}

impl SinkKey {
    pub fn new(namespace: impl Into<String>, set: impl Into<String>, key: i64) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            key,
        }
    }
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.set, self.key)
    }
}

/// Named value stored under a [SinkKey].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Creates connections to the store.
#[trait_variant::make(Send)]
pub trait Connector: Send + Sync + 'static {
    type Connection: KvConnection;

    async fn connect(&self) -> Result<Self::Connection>;
}

/// An established connection to the store.
#[trait_variant::make(Send)]
pub trait KvConnection: Send + 'static {
    /// False once the connection was closed or hit a transport failure.
    fn is_connected(&self) -> bool;

    /// Puts all the fields under the key.
    async fn put(&mut self, key: &SinkKey, fields: &[Field]) -> Result<()>;

    async fn close(&mut self);
}

/// Shared handle on the single store connection. The lock is held across connect and put, so
/// concurrent writes, including those of one batch, reach the store one at a time.
pub struct SinkConnection<C: Connector> {
    connector: C,
    conn: Mutex<Option<C::Connection>>,
}

impl<C: Connector> SinkConnection<C> {
    /// Creates a disconnected handle, the first write connects.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            conn: Mutex::new(None),
        }
    }

    pub async fn write(&self, key: &SinkKey, fields: &[Field]) -> Result<()> {
        let mut guard = self.conn.lock().await;

        let conn = match guard.take() {
            Some(conn) if conn.is_connected() => guard.insert(conn),
            stale => {
                if let Some(mut stale) = stale {
                    debug!("Dropping broken sink connection");
                    stale.close().await;
                }
                let conn = self
                    .connector
                    .connect()
                    .await
                    .inspect_err(|e| warn!(?e, "Failed to connect to sink"))?;
                info!("Connected to sink");
                guard.insert(conn)
            }
        };

        conn.put(key, fields).await
    }

    /// Closes the underlying connection if there is one. Closing twice is a no-op.
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            conn.close().await;
            info!("Closed sink connection");
        }
    }
}
