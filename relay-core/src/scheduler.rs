//! Periodic flush of the [PendingRegistry]. Every tick drains the registry and processes the
//! drained batch concurrently; the next tick is not handled before the whole batch is done.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::BatchExecutor;
use crate::registry::PendingRegistry;
use crate::sink::Connector;

pub(crate) struct BatchScheduler<C: Connector> {
    registry: Arc<PendingRegistry>,
    executor: Arc<BatchExecutor<C>>,
    window: Duration,
    cancel: CancellationToken,
}

impl<C: Connector> BatchScheduler<C> {
    pub(crate) fn new(
        registry: Arc<PendingRegistry>,
        executor: BatchExecutor<C>,
        window: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            executor: Arc::new(executor),
            window,
            cancel,
        }
    }

    /// Runs until the cancellation token is cancelled. Cancellation is only observed between
    /// drains, a drain which already started always runs to completion.
    pub(crate) async fn run(self) {
        let mut ticker = time::interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(window = ?self.window, "Starting batch scheduler");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }

        let leftover = self.registry.drain_and_reset();
        if !leftover.is_empty() {
            warn!(
                count = leftover.len(),
                "Dropping pending messages without an outcome on shutdown"
            );
        }
        info!("Batch scheduler stopped");
    }

    /// Drains the registry and waits until every drained message has been processed.
    async fn flush(&self) {
        let batch = self.registry.drain_and_reset();
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        debug!(count, "Flushing batch");

        let mut tasks = JoinSet::new();
        for (_, entry) in batch {
            let executor = Arc::clone(&self.executor);
            tasks.spawn(async move { executor.process(entry.message, entry.signal).await });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                // the signal went down with the task, its waiter observes the drop
                error!(?e, "Batch executor task failed");
            }
        }

        debug!(count, "Batch flushed");
    }
}
