use async_nats::jetstream;
use bytes::Bytes;

use crate::{Error, JetstreamConfig, Result, connect, get_or_create_stream};

#[derive(Clone)]
pub struct JetstreamPublisher {
    context: jetstream::Context,
    subject: String,
}

impl JetstreamPublisher {
    pub async fn connect(config: JetstreamConfig) -> Result<Self> {
        let client = connect(&config).await?;
        let context = jetstream::new(client);
        get_or_create_stream(&context, &config.topic).await?;
        Ok(Self {
            context,
            subject: config.topic,
        })
    }

    /// Publishes the payload and waits for the stream to persist it.
    pub async fn publish(&self, payload: Bytes) -> Result<()> {
        let ack = self
            .context
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| Error::Publish(format!("Publishing to {}: {e}", self.subject)))?;
        ack.await
            .map_err(|e| Error::Publish(format!("Waiting for publish ack: {e}")))?;
        Ok(())
    }
}
