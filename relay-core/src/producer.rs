use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use relay_nats::producer::JetstreamPublisher;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::message::RelayMessage;

pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Message published at `now`: the unix seconds as id and the RFC 3339 time as timestamp.
fn message_at(now: DateTime<Utc>) -> RelayMessage {
    RelayMessage {
        id: now.timestamp(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Publishes a [RelayMessage] on the topic every `interval` until cancelled. Failed publishes
/// are logged and skipped.
pub async fn run(settings: &Settings, interval: Duration, cancel: CancellationToken) -> Result<()> {
    let publisher = JetstreamPublisher::connect(settings.jetstream_config()).await?;
    info!(topic = %settings.queue.topic, ?interval, "Starting producer");

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut published = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let message = message_at(Utc::now());
        let payload = match Bytes::try_from(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(?e, "Failed to serialize message");
                continue;
            }
        };

        match publisher.publish(payload).await {
            Ok(()) => {
                published += 1;
                debug!(id = message.id, "Published message");
            }
            Err(e) => warn!(?e, id = message.id, "Failed to publish message"),
        }
    }

    info!(published, "Producer stopped");
    Ok(())
}
