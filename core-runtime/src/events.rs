//! # Event Bus System
//!
//! Provides an event-driven channel for the music player core using
//! `tokio::sync::broadcast`. Library synchronisation and playlist mutations
//! publish typed events here so that hosts can react (refresh a badge, show a
//! toast) without polling the live views.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Library source ├─────────>│           ├────────────>│ Subscriber │
//! └────────────────┘          │ EventBus  │             └────────────┘
//! ┌────────────────┐   emit   │ (broadcast│  subscribe  ┌────────────┐
//! │PlaylistManager ├─────────>│  channel) ├────────────>│ Subscriber │
//! └────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playlist(PlaylistEvent::Created {
//!     playlist_id: 1,
//!     name: "Road Trip".to_string(),
//! }))
//! .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Playlist created");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber keeps receiving newer events.
//! - **`RecvError::Closed`**: All senders have been dropped (shutdown).
//!
//! Producers ignore `SendError`: having nobody listening is not a failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Library catalog events
    Library(LibraryEvent),
    /// Playlist events
    Playlist(PlaylistEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Playlist(e) => e.description(),
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to the library catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// The catalog was replaced by a fresh scan.
    Synced {
        /// Tracks that were not known before.
        added: u64,
        /// Known tracks whose metadata changed.
        updated: u64,
        /// Tracks whose media disappeared.
        removed: u64,
    },
    /// A single track was removed from the catalog.
    TrackRemoved {
        /// URI of the removed track.
        uri: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::Synced { .. } => "Library synced",
            LibraryEvent::TrackRemoved { .. } => "Track removed from library",
        }
    }
}

// ============================================================================
// Playlist Events
// ============================================================================

/// Events related to playlist mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaylistEvent {
    /// New playlist created.
    Created { playlist_id: i64, name: String },
    /// Playlist renamed.
    Renamed { playlist_id: i64, name: String },
    /// Playlist and its membership rows deleted.
    Deleted { playlist_id: i64 },
    /// Tracks linked to a playlist; `count` excludes ignored duplicates.
    TracksAdded { playlist_id: i64, count: u64 },
    /// Tracks unlinked from a playlist.
    TracksRemoved { playlist_id: i64, count: u64 },
}

impl PlaylistEvent {
    fn description(&self) -> &str {
        match self {
            PlaylistEvent::Created { .. } => "Playlist created",
            PlaylistEvent::Renamed { .. } => "Playlist renamed",
            PlaylistEvent::Deleted { .. } => "Playlist deleted",
            PlaylistEvent::TracksAdded { .. } => "Tracks added to playlist",
            PlaylistEvent::TracksRemoved { .. } => "Tracks removed from playlist",
        }
    }

    /// Playlist the event refers to.
    pub fn playlist_id(&self) -> i64 {
        match self {
            PlaylistEvent::Created { playlist_id, .. }
            | PlaylistEvent::Renamed { playlist_id, .. }
            | PlaylistEvent::Deleted { playlist_id }
            | PlaylistEvent::TracksAdded { playlist_id, .. }
            | PlaylistEvent::TracksRemoved { playlist_id, .. } => *playlist_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let playlist_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playlist(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: i64) -> CoreEvent {
        CoreEvent::Playlist(PlaylistEvent::Created {
            playlist_id: id,
            name: format!("Playlist {}", id),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(created(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Library(LibraryEvent::Synced {
            added: 3,
            updated: 1,
            removed: 0,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playlist(_)));

        bus.emit(CoreEvent::Library(LibraryEvent::TrackRemoved {
            uri: "file:///music/a.mp3".to_string(),
        }))
        .ok();
        bus.emit(created(7)).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received, created(7));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(created(i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        // Subscriber recovers with the newest buffered events
        assert!(sub.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(created(2)).ok();
        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, created(2));
    }

    #[test]
    fn test_playlist_event_accessors() {
        let event = PlaylistEvent::TracksAdded {
            playlist_id: 4,
            count: 2,
        };
        assert_eq!(event.playlist_id(), 4);
        assert_eq!(
            CoreEvent::Playlist(event).description(),
            "Tracks added to playlist"
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Playlist(PlaylistEvent::Renamed {
            playlist_id: 3,
            name: "Focus".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Playlist\""));
        assert!(json.contains("Renamed"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
