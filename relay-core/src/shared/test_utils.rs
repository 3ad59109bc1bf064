//! In-memory stand-ins for the sink and the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{QueueConfig, Settings, SinkConfig};
use crate::error::{Error, Result};
use crate::message::ReadAck;
use crate::sink::{Connector, Field, KvConnection, SinkKey};
use crate::source::{Delivery, Source};

/// Forces connect and put failures on an [InMemoryConnector].
#[derive(Debug, Default)]
pub(crate) struct SinkErrorInjector {
    /// Fail the next N connect attempts.
    fail_next_connects: AtomicUsize,
    /// Fail the next N puts, breaking the connection.
    fail_next_puts: AtomicUsize,
    put_latency_ms: AtomicU64,
}

impl SinkErrorInjector {
    pub(crate) fn fail_connects(&self, count: usize) {
        self.fail_next_connects.store(count, Ordering::Relaxed);
    }

    pub(crate) fn fail_puts(&self, count: usize) {
        self.fail_next_puts.store(count, Ordering::Relaxed);
    }

    pub(crate) fn set_put_latency(&self, latency: Duration) {
        self.put_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    fn should_fail_connect(&self) -> bool {
        Self::decrement_counter(&self.fail_next_connects)
    }

    fn should_fail_put(&self) -> bool {
        Self::decrement_counter(&self.fail_next_puts)
    }

    fn decrement_counter(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1))
            .is_ok()
    }

    async fn apply_put_latency(&self) {
        let ms = self.put_latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryStore {
    records: Mutex<HashMap<String, Vec<Field>>>,
    injector: SinkErrorInjector,
    connect_attempts: AtomicUsize,
    puts: AtomicUsize,
    closes: AtomicUsize,
}

/// Connector over a shared in-memory map. Clones observe the same store.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryConnector {
    store: Arc<InMemoryStore>,
}

impl InMemoryConnector {
    pub(crate) fn injector(&self) -> &SinkErrorInjector {
        &self.store.injector
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<Field>> {
        self.store.records.lock().get(key).cloned()
    }

    pub(crate) fn connect_attempts(&self) -> usize {
        self.store.connect_attempts.load(Ordering::SeqCst)
    }

    /// Successful puts only.
    pub(crate) fn put_count(&self) -> usize {
        self.store.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.store.closes.load(Ordering::SeqCst)
    }
}

impl Connector for InMemoryConnector {
    type Connection = InMemoryConnection;

    async fn connect(&self) -> Result<InMemoryConnection> {
        self.store.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.store.injector.should_fail_connect() {
            return Err(Error::Sink("injected connect failure".to_string()));
        }
        Ok(InMemoryConnection {
            store: Arc::clone(&self.store),
            connected: true,
            closed: false,
        })
    }
}

pub(crate) struct InMemoryConnection {
    store: Arc<InMemoryStore>,
    connected: bool,
    closed: bool,
}

impl KvConnection for InMemoryConnection {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn put(&mut self, key: &SinkKey, fields: &[Field]) -> Result<()> {
        self.store.injector.apply_put_latency().await;
        if self.store.injector.should_fail_put() {
            self.connected = false;
            return Err(Error::SinkWrite("injected put failure".to_string()));
        }

        let mut records = self.store.records.lock();
        let record = records.entry(key.to_string()).or_default();
        for field in fields {
            match record.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => existing.value.clone_from(&field.value),
                None => record.push(field.clone()),
            }
        }
        self.store.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.connected = false;
            self.store.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Test side of an in-memory queue, see [in_memory_queue].
pub(crate) struct InMemoryQueue {
    deliveries: Option<mpsc::UnboundedSender<Bytes>>,
    acks: mpsc::UnboundedReceiver<(Bytes, ReadAck)>,
    progress: Arc<AtomicUsize>,
}

impl InMemoryQueue {
    /// Dropped silently once the source is gone or the queue was closed.
    pub(crate) fn publish(&self, payload: impl Into<Bytes>) {
        if let Some(deliveries) = &self.deliveries {
            let _ = deliveries.send(payload.into());
        }
    }

    /// Ends the stream, the source returns `None` once the published messages are consumed.
    pub(crate) fn close(&mut self) {
        self.deliveries.take();
    }

    /// Next ack or nak sent back by the relay, in resolution order.
    pub(crate) async fn next_ack(&mut self) -> Option<(Bytes, ReadAck)> {
        self.acks.recv().await
    }

    pub(crate) fn try_next_ack(&mut self) -> Option<(Bytes, ReadAck)> {
        self.acks.try_recv().ok()
    }

    pub(crate) fn progress_count(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }
}

pub(crate) struct InMemorySource {
    deliveries: mpsc::UnboundedReceiver<Bytes>,
    acks: mpsc::UnboundedSender<(Bytes, ReadAck)>,
    progress: Arc<AtomicUsize>,
    disconnected: CancellationToken,
}

pub(crate) fn in_memory_queue() -> (InMemoryQueue, InMemorySource) {
    let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
    let (acks_tx, acks_rx) = mpsc::unbounded_channel();
    let progress = Arc::new(AtomicUsize::new(0));
    (
        InMemoryQueue {
            deliveries: Some(deliveries_tx),
            acks: acks_rx,
            progress: Arc::clone(&progress),
        },
        InMemorySource {
            deliveries: deliveries_rx,
            acks: acks_tx,
            progress,
            disconnected: CancellationToken::new(),
        },
    )
}

impl Source for InMemorySource {
    type Delivery = InMemoryDelivery;

    async fn next(&mut self) -> Option<Result<InMemoryDelivery>> {
        let payload = tokio::select! {
            biased;

            _ = self.disconnected.cancelled() => return None,
            payload = self.deliveries.recv() => payload?,
        };
        Some(Ok(InMemoryDelivery {
            payload,
            acks: self.acks.clone(),
            progress: Arc::clone(&self.progress),
        }))
    }

    fn disconnect(&self) {
        self.disconnected.cancel();
    }
}

pub(crate) struct InMemoryDelivery {
    payload: Bytes,
    acks: mpsc::UnboundedSender<(Bytes, ReadAck)>,
    progress: Arc<AtomicUsize>,
}

impl Delivery for InMemoryDelivery {
    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    async fn ack(self) -> Result<()> {
        self.acks
            .send((self.payload, ReadAck::Ack))
            .map_err(|e| Error::Queue(format!("queue is gone: {e}")))
    }

    async fn nak(self) -> Result<()> {
        self.acks
            .send((self.payload, ReadAck::Nak))
            .map_err(|e| Error::Queue(format!("queue is gone: {e}")))
    }

    async fn term(self) -> Result<()> {
        self.acks
            .send((self.payload, ReadAck::Term))
            .map_err(|e| Error::Queue(format!("queue is gone: {e}")))
    }

    async fn in_progress(&self) -> Result<()> {
        self.progress.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Valid settings pointing at local servers, window 1s and cap 3.
pub(crate) fn test_settings() -> Settings {
    Settings {
        window_secs: 1,
        max_per_window: 3,
        drain_timeout_secs: None,
        queue: QueueConfig {
            addr: "localhost:4222".to_string(),
            topic: "relay".to_string(),
            channel: "ch".to_string(),
            max_deliver: 5,
            nak_delay_ms: 1000,
            user: None,
            password: None,
            token: None,
        },
        sink: SinkConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            namespace: "test".to_string(),
            set: "messages".to_string(),
            connect_timeout_ms: 1000,
            write_timeout_ms: 1000,
        },
    }
}
