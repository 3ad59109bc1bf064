//! Messages waiting for the next batch. [PendingRegistry::register] and
//! [PendingRegistry::drain_and_reset] are the only ways to mutate it. A drain swaps the whole map
//! for an empty one inside a single critical section, so a registration racing with a drain ends
//! up either in the drained batch or in the next one, never in both and never in neither.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::message::{MessageHandle, PendingMessage};

/// Resolved exactly once by the executor with the outcome of the message.
pub(crate) type CompletionSignal = oneshot::Sender<Result<()>>;

/// Awaited exactly once by the submitter of the message.
pub(crate) type CompletionWaiter = oneshot::Receiver<Result<()>>;

#[derive(Debug)]
pub(crate) struct PendingEntry {
    pub(crate) message: PendingMessage,
    pub(crate) signal: CompletionSignal,
}

#[derive(Debug, Default)]
pub(crate) struct PendingRegistry {
    // never held across an .await
    entries: Mutex<HashMap<MessageHandle, PendingEntry>>,
}

impl PendingRegistry {
    pub(crate) fn register(&self, message: PendingMessage) -> CompletionWaiter {
        let (signal, waiter) = oneshot::channel();
        self.entries
            .lock()
            .insert(message.handle, PendingEntry { message, signal });
        waiter
    }

    pub(crate) fn drain_and_reset(&self) -> HashMap<MessageHandle, PendingEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
