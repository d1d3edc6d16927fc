use std::collections::HashSet;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use agora_types::RealtimeEvent;

/// An open realtime channel. Owned by whoever opened it; dropping the handle
/// (or calling [`Subscription::unsubscribe`]) releases it, after which no
/// further events are delivered.
///
/// A receiver that falls behind loses the oldest events. `next` logs the gap
/// and carries on; [`Subscription::take_missed`] tells the owner how many
/// were lost so it can resynchronize.
pub struct Subscription {
    id: Uuid,
    channels: HashSet<String>,
    rx: Option<broadcast::Receiver<RealtimeEvent>>,
    missed: u64,
}

impl Subscription {
    pub fn new(channels: &[String], rx: broadcast::Receiver<RealtimeEvent>) -> Self {
        let id = Uuid::new_v4();
        debug!("Subscription {} opened on {:?}", id, channels);
        Self {
            id,
            channels: channels.iter().cloned().collect(),
            rx: Some(rx),
            missed: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Wait for the next event on one of this subscription's channels.
    /// Returns `None` once unsubscribed or when the backend goes away.
    pub async fn next(&mut self) -> Option<RealtimeEvent> {
        loop {
            let rx = self.rx.as_mut()?;
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("Subscription {} lagged by {} events", self.id, n);
                    self.missed = self.missed.saturating_add(n);
                    continue;
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            };

            if event.channels.iter().any(|c| self.channels.contains(c)) {
                return Some(event);
            }
        }
    }

    /// Events dropped because this subscription fell behind, since the last
    /// call. Resets the count.
    pub fn take_missed(&mut self) -> u64 {
        std::mem::take(&mut self.missed)
    }

    pub fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            debug!("Subscription {} released", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
