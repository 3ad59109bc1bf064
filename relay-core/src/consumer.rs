//! Pulls deliveries from the [Source] and hands each of them to the [IngestionGate]. At most
//! `max_in_flight` deliveries are unresolved at any time, a new delivery is only pulled once an
//! earlier one has been acked or naked.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::gate::IngestionGate;
use crate::message::ReadAck;
use crate::source::{Delivery, Source};

/// How often a delivery waiting for its batch is reported as in progress to the queue.
const PROGRESS_ACK_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) struct Consumer<S: Source> {
    source: S,
    gate: IngestionGate,
    max_in_flight: u32,
    drain_timeout: Duration,
    cancel: CancellationToken,
}

impl<S: Source> Consumer<S> {
    pub(crate) fn new(
        source: S,
        gate: IngestionGate,
        max_in_flight: u32,
        drain_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            gate,
            max_in_flight,
            drain_timeout,
            cancel,
        }
    }

    /// Consumes until cancelled or until the source closes, then disconnects from the source and
    /// waits (at most `drain_timeout`) for the outstanding deliveries to be resolved.
    pub(crate) async fn run(mut self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight as usize));
        info!(max_in_flight = self.max_in_flight, "Starting consumer");

        loop {
            let permit = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit
                    .map_err(|e| Error::Queue(format!("Acquiring in-flight permit: {e}")))?,
            };

            let next = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                next = self.source.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(?e, "Failed to receive message from the queue");
                    continue;
                }
                None => {
                    warn!("Queue subscription closed");
                    break;
                }
            };

            let gate = self.gate.clone();
            tokio::spawn(async move {
                handle_delivery(delivery, gate).await;
                drop(permit);
            });
        }

        self.source.disconnect();
        info!("Disconnected from the queue, waiting for in-flight messages");

        let all_permits = semaphore.acquire_many(self.max_in_flight);
        match time::timeout(self.drain_timeout, all_permits).await {
            Ok(Ok(_)) => info!("All in-flight messages resolved"),
            Ok(Err(e)) => error!(?e, "In-flight permits closed"),
            Err(_) => warn!(
                unresolved = self.max_in_flight as usize - semaphore.available_permits(),
                timeout = ?self.drain_timeout,
                "Timed out waiting for in-flight messages, the queue will redeliver them"
            ),
        }
        Ok(())
    }
}

// Waits for the outcome of the delivery while keeping it alive on the queue, then acks or naks.
async fn handle_delivery<D: Delivery>(delivery: D, gate: IngestionGate) {
    let submit = gate.submit(delivery.payload());
    tokio::pin!(submit);

    let mut progress = time::interval_at(
        Instant::now() + PROGRESS_ACK_INTERVAL,
        PROGRESS_ACK_INTERVAL,
    );

    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome,
            _ = progress.tick() => {
                if let Err(e) = delivery.in_progress().await {
                    // the next tick tries again
                    warn!(?e, "Failed to send InProgress Ack for message");
                }
            }
        }
    };

    match ReadAck::from(&outcome) {
        ReadAck::Ack => {
            if let Err(e) = delivery.ack().await {
                error!(?e, "Failed to send Ack for message");
            }
        }
        ReadAck::Nak => {
            debug!(?outcome, "Requeueing message");
            if let Err(e) = delivery.nak().await {
                error!(?e, "Failed to send Nak for message");
            }
        }
        ReadAck::Term => {
            warn!(?outcome, "Dropping message which can never be relayed");
            if let Err(e) = delivery.term().await {
                error!(?e, "Failed to send Term for message");
            }
        }
    }
}
