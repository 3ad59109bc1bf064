use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::message::{PendingMessage, RelayMessage, Validator};
use crate::registry::CompletionSignal;
use crate::sink::{Connector, SinkConnection, SinkKey};

/// Writes a single pending message to the sink and resolves its [CompletionSignal].
pub(crate) struct BatchExecutor<C: Connector> {
    sink: Arc<SinkConnection<C>>,
    namespace: String,
    set: String,
    validator: Validator,
}

impl<C: Connector> BatchExecutor<C> {
    pub(crate) fn new(
        sink: Arc<SinkConnection<C>>,
        namespace: impl Into<String>,
        set: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
            set: set.into(),
            validator: RelayMessage::validate,
        }
    }

    pub(crate) fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Always resolves the signal, whatever happens to the message.
    pub(crate) async fn process(&self, message: PendingMessage, signal: CompletionSignal) {
        let handle = message.handle;
        let outcome = self.write(&message).await;
        match &outcome {
            Ok(()) => debug!(%handle, "Message written to sink"),
            Err(e) => warn!(%handle, ?e, "Failed to relay message"),
        }

        if signal.send(outcome).is_err() {
            warn!(%handle, "Submitter stopped waiting for the outcome");
        }
    }

    async fn write(&self, message: &PendingMessage) -> Result<()> {
        let parsed = RelayMessage::try_from(message.payload.as_ref())?;
        (self.validator)(&parsed).map_err(|e| match e {
            Error::CorruptMessage(_) => e,
            other => Error::CorruptMessage(other.to_string()),
        })?;

        let key = SinkKey::new(self.namespace.as_str(), self.set.as_str(), parsed.id);
        self.sink
            .write(&key, &parsed.fields())
            .await
            .map_err(|e| match e {
                Error::SinkWrite(_) => e,
                other => Error::SinkWrite(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::oneshot;

    use super::*;
    use crate::sink::Field;
    use crate::shared::test_utils::InMemoryConnector;

    fn executor(connector: &InMemoryConnector) -> BatchExecutor<InMemoryConnector> {
        let sink = Arc::new(SinkConnection::new(connector.clone()));
        BatchExecutor::new(sink, "test", "messages")
    }

    async fn process(executor: &BatchExecutor<InMemoryConnector>, payload: &'static str) -> Result<()> {
        let (signal, waiter) = oneshot::channel();
        executor
            .process(PendingMessage::new(Bytes::from_static(payload.as_bytes())), signal)
            .await;
        waiter.await.unwrap()
    }

    #[tokio::test]
    async fn test_process_writes_timestamp() {
        let connector = InMemoryConnector::default();
        let executor = executor(&connector);

        process(&executor, r#"{"id": 1, "timestamp": "t1"}"#)
            .await
            .unwrap();
        assert_eq!(
            connector.get("test:messages:1"),
            Some(vec![Field::new("timestamp", "t1")])
        );
    }

    #[tokio::test]
    async fn test_corrupt_message_never_reaches_sink() {
        let connector = InMemoryConnector::default();
        let executor = executor(&connector);

        let err = process(&executor, r#"{"id": "one", "timestamp": "t1"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptMessage(_)));

        let err = process(&executor, r#"{"id": 1, "timestamp": ""}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptMessage(_)));

        assert_eq!(connector.connect_attempts(), 0);
        assert_eq!(connector.put_count(), 0);
    }

    #[tokio::test]
    async fn test_custom_validator() {
        fn positive_ids(message: &RelayMessage) -> Result<()> {
            if message.id <= 0 {
                return Err(Error::Config(format!("id {} is not positive", message.id)));
            }
            Ok(())
        }

        let connector = InMemoryConnector::default();
        let executor = executor(&connector).with_validator(positive_ids);

        let err = process(&executor, r#"{"id": -1, "timestamp": "t"}"#)
            .await
            .unwrap_err();
        // whatever the validator returns is reported as a corrupt message
        assert!(matches!(err, Error::CorruptMessage(ref msg) if msg.contains("not positive")));
        process(&executor, r#"{"id": 2, "timestamp": "t"}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sink_failures_are_reported_as_write_errors() {
        let connector = InMemoryConnector::default();
        let executor = executor(&connector);

        connector.injector().fail_connects(1);
        let err = process(&executor, r#"{"id": 1, "timestamp": "t1"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SinkWrite(_)));

        connector.injector().fail_puts(1);
        let err = process(&executor, r#"{"id": 1, "timestamp": "t1"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SinkWrite(_)));

        process(&executor, r#"{"id": 1, "timestamp": "t1"}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_process_without_waiter() {
        let connector = InMemoryConnector::default();
        let executor = executor(&connector);

        let (signal, waiter) = oneshot::channel();
        drop(waiter);
        executor
            .process(
                PendingMessage::new(Bytes::from_static(br#"{"id": 5, "timestamp": "t5"}"#)),
                signal,
            )
            .await;
        // the write still happens
        assert!(connector.get("test:messages:5").is_some());
    }
}
