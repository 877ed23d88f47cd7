//! Progress event fan-out from the job worker to observer sinks.

use crate::types::ProgressEvent;
use tokio::sync::broadcast;

/// Capacity of the per-subscriber event queue.
const EVENT_BUFFER: usize = 256;

/// Multi-producer, multi-consumer event channel.
///
/// [`ProgressBridge::emit`] never blocks the producer: each subscriber has a
/// bounded queue of [`EVENT_BUFFER`] events, and a subscriber that falls
/// further behind loses the oldest queued events (it observes the loss as a
/// `Lagged` recv error). A slow or absent subscriber therefore never stalls
/// the job. Per-title emission order is preserved for every subscriber that
/// keeps up.
#[derive(Debug, Clone)]
pub struct ProgressBridge {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBridge {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Attach a new sink. Each receiver sees every event emitted after this
    /// call, independently of other receivers.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers. A send with no
    /// subscribers is not an error.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
