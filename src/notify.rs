use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-venue broadcast of booking-store events for LISTEN subscribers.
/// Delivery is best effort: lagging or absent listeners never block a write.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a venue's events, creating the channel on first use.
    pub fn subscribe(&self, venue_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(venue_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let venue_id = event.venue_id();
        if let Some(sender) = self.channels.get(&venue_id)
            && sender.send(event.clone()).is_err()
        {
            tracing::trace!("no live listeners for venue {venue_id}");
        }
    }

    /// Drop channels whose receivers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
