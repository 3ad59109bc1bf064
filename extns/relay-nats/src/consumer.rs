use async_nats::jetstream::consumer::{AckPolicy, PullConsumer, pull};
use async_nats::jetstream::{self, AckKind};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Error, JetstreamConfig, Result, connect, get_or_create_stream};

/// A message pulled from JetStream. It has to be resolved with [JetstreamDelivery::ack],
/// [JetstreamDelivery::nak] or [JetstreamDelivery::term], otherwise the server redelivers it once
/// the ack wait expires.
pub struct JetstreamDelivery {
    message: jetstream::Message,
    nak_delay: Duration,
}

impl JetstreamDelivery {
    pub fn payload(&self) -> Bytes {
        self.message.payload.clone()
    }

    pub async fn ack(self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| Error::Jetstream(format!("Sending Ack: {e}")))
    }

    /// Asks the server to redeliver the message after the configured delay.
    pub async fn nak(self) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(Some(self.nak_delay)))
            .await
            .map_err(|e| Error::Jetstream(format!("Sending Nak: {e}")))
    }

    /// Tells the server to never redeliver the message.
    pub async fn term(self) -> Result<()> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| Error::Jetstream(format!("Sending Term: {e}")))
    }

    /// Resets the server side ack timer, used while the message waits for its batch.
    pub async fn in_progress(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Progress)
            .await
            .map_err(|e| Error::Jetstream(format!("Sending InProgress Ack: {e}")))
    }
}

/// Handle to the background task pulling from a durable JetStream consumer. The server never
/// has more than `max_in_flight` unacknowledged messages outstanding for this consumer.
pub struct JetstreamConsumer {
    messages: mpsc::Receiver<Result<JetstreamDelivery>>,
    cancel: CancellationToken,
}

impl JetstreamConsumer {
    pub async fn connect(
        config: JetstreamConfig,
        max_in_flight: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client = connect(&config).await?;
        let context = jetstream::new(client);
        let stream = get_or_create_stream(&context, &config.topic).await?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &config.channel,
                pull::Config {
                    durable_name: Some(config.channel.clone()),
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: max_in_flight as i64,
                    max_deliver: config.max_deliver,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Subscription {
                stream: config.topic.clone(),
                consumer: config.channel.clone(),
                error: e.to_string(),
            })?;

        let messages = consumer.messages().await.map_err(|e| Error::Subscription {
            stream: config.topic.clone(),
            consumer: config.channel.clone(),
            error: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(max_in_flight.max(1));
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                info!(stream = ?config.topic, consumer = ?config.channel, "Starting JetStream consumer...");
                read_messages(messages, tx, config.nak_delay, cancel).await;
            }
        });

        Ok(Self {
            messages: rx,
            cancel,
        })
    }

    /// Returns the next delivery, or `None` once the consumer is disconnected.
    pub async fn next(&mut self) -> Option<Result<JetstreamDelivery>> {
        self.messages.recv().await
    }

    /// Stops pulling from the server. Deliveries already handed out can still be acked.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

// Dropping the sender on return closes the channel, which is how the receiving side learns that
// the consumer is gone.
async fn read_messages(
    messages: pull::Stream,
    tx: mpsc::Sender<Result<JetstreamDelivery>>,
    nak_delay: Duration,
    cancel: CancellationToken,
) {
    tokio::pin!(messages);
    loop {
        let next = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Cancellation token is cancelled, disconnecting from JetStream");
                return;
            }
            next = messages.next() => next,
        };

        let Some(next) = next else {
            warn!("JetStream message stream ended");
            return;
        };

        let delivery = next
            .map(|message| JetstreamDelivery { message, nak_delay })
            .map_err(|e| Error::Jetstream(format!("Pulling message: {e}")));

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Cancellation token is cancelled, disconnecting from JetStream");
                return;
            }
            sent = tx.send(delivery) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
