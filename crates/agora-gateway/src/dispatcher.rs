use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use agora_types::RealtimeEvent;

use crate::subscription::Subscription;

const DEFAULT_CAPACITY: usize = 1024;

/// Fans realtime events out to every open subscription.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All subscribers receive all events; each filters by its own channels
    broadcast_tx: broadcast::Sender<RealtimeEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A dispatcher buffering at most `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    pub fn subscribe(&self, channels: &[String]) -> Subscription {
        Subscription::new(channels, self.inner.broadcast_tx.subscribe())
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: RealtimeEvent) {
        trace!("Publishing {:?}", event.events.first());
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}
