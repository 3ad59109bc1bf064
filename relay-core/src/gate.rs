use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::PendingMessage;
use crate::registry::PendingRegistry;

/// Entry point for every arriving message. [IngestionGate::submit] parks the caller until the
/// batch containing its message has been processed; together with the queue's max-in-flight
/// limit this is what throttles ingestion to at most `max_per_window` messages per window.
#[derive(Clone)]
pub(crate) struct IngestionGate {
    registry: Arc<PendingRegistry>,
}

impl IngestionGate {
    pub(crate) fn new(registry: Arc<PendingRegistry>) -> Self {
        Self { registry }
    }

    pub(crate) async fn submit(&self, payload: Bytes) -> Result<()> {
        let message = PendingMessage::new(payload);
        let handle = message.handle;
        let waiter = self.registry.register(message);
        debug!(%handle, pending = self.registry.len(), "Message is waiting for the next batch");

        waiter.await.map_err(|e| {
            Error::ActorPatternRecv(format!(
                "Outcome of message {handle} was never delivered: {e}"
            ))
        })?
    }
}
