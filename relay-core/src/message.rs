use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::sink::Field;

/// Name of the field the message timestamp is written under.
pub(crate) const TIMESTAMP_FIELD: &str = "timestamp";

/// Identity of an arrived message. Two arrivals with identical payloads get distinct handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(Uuid);

impl MessageHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message waiting in the registry for the next batch.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub handle: MessageHandle,
    pub payload: Bytes,
}

impl PendingMessage {
    pub(crate) fn new(payload: Bytes) -> Self {
        Self {
            handle: MessageHandle::new(),
            payload,
        }
    }
}

/// Payload published on the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub id: i64,
    pub timestamp: String,
}

/// Pass/fail check applied to every parsed payload before it is written.
pub type Validator = fn(&RelayMessage) -> Result<()>;

impl RelayMessage {
    /// Default [Validator].
    pub fn validate(&self) -> Result<()> {
        if self.timestamp.trim().is_empty() {
            return Err(Error::CorruptMessage(format!(
                "message {} has an empty timestamp",
                self.id
            )));
        }
        Ok(())
    }

    /// Fields written to the sink under the message id.
    pub(crate) fn fields(&self) -> Vec<Field> {
        vec![Field::new(TIMESTAMP_FIELD, self.timestamp.clone())]
    }
}

impl TryFrom<&[u8]> for RelayMessage {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        serde_json::from_slice(value).map_err(|e| {
            Error::CorruptMessage(format!(
                "Parsing payload {:?}: {e}",
                String::from_utf8_lossy(value)
            ))
        })
    }
}

impl TryFrom<&RelayMessage> for Bytes {
    type Error = Error;

    fn try_from(value: &RelayMessage) -> Result<Self> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::CorruptMessage(format!("Serializing message {}: {e}", value.id)))
    }
}

/// Decision sent back to the queue once the outcome of a message is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadAck {
    /// Written to the sink, the queue can forget the message.
    Ack,
    /// Failed, the queue should redeliver it.
    Nak,
    /// Can never succeed, the queue should drop it without redelivery.
    Term,
}

impl<T> From<&Result<T>> for ReadAck {
    fn from(outcome: &Result<T>) -> Self {
        match outcome {
            Ok(_) => ReadAck::Ack,
            Err(Error::CorruptMessage(_)) => ReadAck::Term,
            Err(_) => ReadAck::Nak,
        }
    }
}
