//! Event bus for plugin host activity.
//!
//! The host publishes a typed event whenever an extension is registered, a torrent or peer
//! chain is attached, or a plugin vetoes a transition. Internally the bus uses
//! `tokio::broadcast` with a bounded buffer plus a replay ring, so a subscriber that
//! reconnects with the last id it saw can catch up. When the channel overflows the oldest
//! events are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Identifier assigned to each published event.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Largest replay ring and channel size a bus will allocate.
pub const MAX_REPLAY_CAPACITY: usize = 1 << 16;

/// Lifecycle transition a torrent plugin may veto.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Pause,
    Resume,
}

/// Typed host events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ExtensionRegistered {
        name: String,
    },
    ExtensionDisabled {
        name: String,
    },
    TorrentAttached {
        torrent_id: Uuid,
        extensions: usize,
    },
    TorrentDeclined {
        torrent_id: Uuid,
    },
    TorrentUnloaded {
        torrent_id: Uuid,
    },
    PeerAttached {
        torrent_id: Uuid,
        peer_id: Uuid,
        extensions: usize,
    },
    PeerDetached {
        torrent_id: Uuid,
        peer_id: Uuid,
        code: i32,
    },
    TransitionVetoed {
        torrent_id: Uuid,
        transition: TransitionKind,
        extension: usize,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ExtensionRegistered { .. } => "extension_registered",
            Self::ExtensionDisabled { .. } => "extension_disabled",
            Self::TorrentAttached { .. } => "torrent_attached",
            Self::TorrentDeclined { .. } => "torrent_declined",
            Self::TorrentUnloaded { .. } => "torrent_unloaded",
            Self::PeerAttached { .. } => "peer_attached",
            Self::PeerDetached { .. } => "peer_detached",
            Self::TransitionVetoed { .. } => "transition_vetoed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The capacity is clamped to `1..=MAX_REPLAY_CAPACITY`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_REPLAY_CAPACITY);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// Never blocks; without subscribers the event only lands in the replay ring.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            self.buffer()
                .iter()
                .filter(|item| item.id > since)
                .cloned()
                .collect()
        });

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Number of events the replay ring retains.
    #[must_use]
    pub const fn replay_capacity(&self) -> usize {
        self.replay_capacity
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.buffer().back().map(|event| event.id)
    }

    /// Snapshot of the replay ring, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<EventEnvelope> {
        self.buffer().iter().cloned().collect()
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream`, skipping over any lagged gaps.
    pub fn into_stream(self) -> impl Stream<Item = EventEnvelope> {
        tokio_stream::iter(self.backlog)
            .chain(BroadcastStream::new(self.receiver).filter_map(Result::ok))
    }
}
