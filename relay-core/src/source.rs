//! The queue side of the relay. A [Source] hands out [Delivery]s, each of which has to be
//! resolved with an ack or a nak once its outcome is known.

use bytes::Bytes;
use relay_nats::consumer::{JetstreamConsumer, JetstreamDelivery};

use crate::error::Result;

/// A single message delivered by the queue.
#[trait_variant::make(Send)]
pub trait Delivery: Send + Sync + 'static {
    fn payload(&self) -> Bytes;

    async fn ack(self) -> Result<()>;

    /// Requeues the message.
    async fn nak(self) -> Result<()>;

    /// Drops the message for good, it is never redelivered.
    async fn term(self) -> Result<()>;

    /// Tells the queue the message is still being worked on.
    async fn in_progress(&self) -> Result<()>;
}

/// A subscription to the queue.
#[trait_variant::make(Send)]
pub trait Source: Send + 'static {
    type Delivery: Delivery;

    /// Next delivery, `None` once the subscription is closed.
    async fn next(&mut self) -> Option<Result<Self::Delivery>>;

    /// Stops receiving new deliveries. Outstanding deliveries can still be resolved.
    fn disconnect(&self);
}

impl Delivery for JetstreamDelivery {
    fn payload(&self) -> Bytes {
        JetstreamDelivery::payload(self)
    }

    async fn ack(self) -> Result<()> {
        JetstreamDelivery::ack(self).await.map_err(Into::into)
    }

    async fn nak(self) -> Result<()> {
        JetstreamDelivery::nak(self).await.map_err(Into::into)
    }

    async fn term(self) -> Result<()> {
        JetstreamDelivery::term(self).await.map_err(Into::into)
    }

    async fn in_progress(&self) -> Result<()> {
        JetstreamDelivery::in_progress(self).await.map_err(Into::into)
    }
}

impl Source for JetstreamConsumer {
    type Delivery = JetstreamDelivery;

    async fn next(&mut self) -> Option<Result<JetstreamDelivery>> {
        JetstreamConsumer::next(self)
            .await
            .map(|delivery| delivery.map_err(Into::into))
    }

    fn disconnect(&self) {
        JetstreamConsumer::disconnect(self)
    }
}
