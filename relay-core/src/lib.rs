//! Relays messages from a JetStream topic into Redis in rate limited batches. Arriving messages
//! are held in a [registry](registry::PendingRegistry) and flushed once per window by the
//! [scheduler](scheduler::BatchScheduler); a message is acked on the queue only after its batch
//! was written. The queue never has more than `max_per_window` unacked messages outstanding,
//! which caps every batch.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::config::Settings;
pub use crate::error::{Error, Result};
pub use crate::lifecycle::{LifecycleState, Relay};

mod error;

/// Settings loaded from a file and `RELAY_` environment variables.
pub mod config;

/// Holds arrived messages until the next window.
mod registry;

/// Parks every arrival until its batch has been processed.
mod gate;

/// Writes one message of a batch to the sink.
mod executor;

/// Flushes the registry once per window.
mod scheduler;

/// Subscription side of the queue.
pub mod source;

/// Pulls deliveries and acks or naks them with the outcome of their batch.
mod consumer;

/// Start and ordered teardown of the whole relay.
mod lifecycle;

pub mod message;

pub mod sink;

/// Demo publisher feeding the topic.
pub mod producer;

pub mod shared;

/// Runs the relay until SIGINT/SIGTERM or until the subscription ends, then stops it.
pub async fn run(settings: Settings) -> Result<()> {
    let mut relay = Relay::start(&settings).await?;

    tokio::select! {
        _ = shared::shutdown_signal() => info!("Shutting down relay"),
        _ = relay.closed() => info!("Queue subscription ended, shutting down relay"),
    }

    relay.stop().await
}

/// Runs the demo producer until SIGINT/SIGTERM.
pub async fn run_producer(settings: Settings, interval: Duration) -> Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shared::shutdown_signal().await;
            cancel.cancel();
        }
    });

    let result = producer::run(&settings, interval, cancel).await;
    shutdown.abort();
    result
}
