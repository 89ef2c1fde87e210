//! Completion signals for hosts watching the store.

use shared::ItemKind;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

/// Emitted after a store collection changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    AnimeListUpdated,
    MangaListUpdated,
    AnimeSearchCompleted,
    MangaSearchCompleted,
}

impl Event {
    pub fn list_updated(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Anime => Event::AnimeListUpdated,
            ItemKind::Manga => Event::MangaListUpdated,
        }
    }

    pub fn search_completed(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Anime => Event::AnimeSearchCompleted,
            ItemKind::Manga => Event::MangaSearchCompleted,
        }
    }
}

/// Events queued per subscriber before further ones are dropped
pub const EVENT_BUFFER: usize = 64;

/// Fan-out of events to every live subscriber
///
/// Delivery is fire-and-forget: sending never blocks. A subscriber that has
/// [`EVENT_BUFFER`] unread events misses new ones until it catches up, and
/// subscribers whose receiver was dropped are pruned on the next notification.
#[derive(Debug, Default)]
pub struct Observers {
    senders: Mutex<Vec<SyncSender<Event>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = mpsc::sync_channel(EVENT_BUFFER);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn notify(&self, event: Event) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(?event, "Subscriber backlog full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        trace!(?event, subscribers = senders.len(), "Notified");
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
