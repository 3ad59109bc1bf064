//! Wires the queue subscription, the batch scheduler and the sink together and tears them down
//! in order: the subscription first (its in-flight deliveries are still flushed by the running
//! scheduler), then the scheduler, then the sink.

use std::sync::Arc;

use relay_nats::consumer::JetstreamConsumer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::consumer::Consumer;
use crate::error::{Error, Result};
use crate::executor::BatchExecutor;
use crate::gate::IngestionGate;
use crate::message::{RelayMessage, Validator};
use crate::registry::PendingRegistry;
use crate::scheduler::BatchScheduler;
use crate::sink::redis_store::RedisConnector;
use crate::sink::{Connector, SinkConnection};
use crate::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Stopping,
    Stopped,
}

/// A running relay, see [Relay::stop].
pub struct Relay<C: Connector> {
    state: LifecycleState,
    sink: Arc<SinkConnection<C>>,
    consumer_cancel: CancellationToken,
    consumer_done: CancellationToken,
    consumer: Option<JoinHandle<Result<()>>>,
    scheduler_cancel: CancellationToken,
    scheduler: Option<JoinHandle<()>>,
}

impl Relay<RedisConnector> {
    /// Starts relaying from JetStream into Redis. Fails if the queue cannot be reached, the sink
    /// is only connected by the first write.
    pub async fn start(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let connector = RedisConnector::new(
            &settings.sink.host,
            settings.sink.port,
            settings.sink_policy(),
        )?;

        let source = JetstreamConsumer::connect(
            settings.jetstream_config(),
            settings.max_per_window as usize,
            CancellationToken::new(),
        )
        .await?;
        info!(addr = %settings.queue.addr, topic = %settings.queue.topic, "Subscribed to the queue");

        Self::start_with(settings, connector, source, RelayMessage::validate)
    }
}

impl<C: Connector> Relay<C> {
    /// Starts the relay over an already established subscription. Does not block.
    pub fn start_with<S: Source>(
        settings: &Settings,
        connector: C,
        source: S,
        validator: Validator,
    ) -> Result<Self> {
        settings.validate()?;

        let registry = Arc::new(PendingRegistry::default());
        let sink = Arc::new(SinkConnection::new(connector));
        let executor = BatchExecutor::new(
            Arc::clone(&sink),
            settings.sink.namespace.as_str(),
            settings.sink.set.as_str(),
        )
        .with_validator(validator);

        let scheduler_cancel = CancellationToken::new();
        let scheduler = BatchScheduler::new(
            Arc::clone(&registry),
            executor,
            settings.window(),
            scheduler_cancel.clone(),
        );
        let scheduler = tokio::spawn(scheduler.run());

        let consumer_cancel = CancellationToken::new();
        let consumer_done = CancellationToken::new();
        let consumer = Consumer::new(
            source,
            IngestionGate::new(registry),
            settings.max_per_window,
            settings.drain_timeout(),
            consumer_cancel.clone(),
        );
        let consumer = tokio::spawn({
            let done = consumer_done.clone().drop_guard();
            async move {
                let _done = done;
                consumer.run().await
            }
        });

        info!(
            window = ?settings.window(),
            max_per_window = settings.max_per_window,
            "Relay started"
        );
        Ok(Self {
            state: LifecycleState::Running,
            sink,
            consumer_cancel,
            consumer_done,
            consumer: Some(consumer),
            scheduler_cancel,
            scheduler: Some(scheduler),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Resolves once the consumer stopped, either because of [Relay::stop] or because the
    /// subscription ended on its own.
    pub async fn closed(&self) {
        self.consumer_done.cancelled().await
    }

    /// Ordered teardown. Stopping a relay which is not running is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != LifecycleState::Running {
            debug!(state = ?self.state, "Relay is not running");
            return Ok(());
        }
        self.state = LifecycleState::Stopping;
        info!("Stopping relay");

        self.consumer_cancel.cancel();
        let consumer = match self.consumer.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Queue(format!("Consumer task failed: {e}")))
                .and_then(|result| result),
            None => Ok(()),
        };
        if let Err(e) = &consumer {
            error!(?e, "Consumer stopped with an error");
        }

        self.scheduler_cancel.cancel();
        let scheduler = match self.scheduler.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Cancelled(format!("Scheduler task failed: {e}"))),
            None => Ok(()),
        };
        if let Err(e) = &scheduler {
            error!(?e, "Scheduler stopped with an error");
        }

        self.sink.close().await;
        self.state = LifecycleState::Stopped;
        info!("Relay stopped");
        consumer.and(scheduler)
    }
}
