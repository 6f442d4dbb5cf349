use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::LedgerEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for ledger mutations: per-item channels plus a firehose.
///
/// This is the invalidation signal for callers that cache projections —
/// every committed mutation lands here, so a subscriber can drop its cache
/// on any event touching an item (or on anything at all, via the firehose).
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<LedgerEvent>>,
    firehose: broadcast::Sender<LedgerEvent>,
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
            firehose: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to mutations of a single item. Creates the channel if needed.
    pub fn subscribe(&self, item_id: Ulid) -> broadcast::Receiver<LedgerEvent> {
        let sender = self
            .channels
            .entry(item_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to every mutation across the pool.
    pub fn subscribe_all(&self) -> broadcast::Receiver<LedgerEvent> {
        self.firehose.subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn send(&self, item_id: Ulid, event: &LedgerEvent) {
        if let Some(sender) = self.channels.get(&item_id) {
            let _ = sender.send(event.clone());
        }
        let _ = self.firehose.send(event.clone());
    }

    /// Remove an item channel (e.g. when the item is retired and drained).
    pub fn remove(&self, item_id: &Ulid) {
        self.channels.remove(item_id);
    }
}
