//! # Library Source
//!
//! The read-only view of the device music catalog that playlists and the
//! playback queue resolve track URIs against.
//!
//! Implementations that are not backed by the shared database must report
//! catalog changes as [`Table::Tracks`] on the shared
//! [`InvalidationTracker`] so that dependent live views refresh.

use crate::error::Result;
use crate::invalidation::{InvalidationTracker, Table};
use crate::live::{LiveSubscription, SharedQuery};
use crate::models::{SyncSummary, Track};
use crate::repositories::TrackRepository;
use async_trait::async_trait;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Snapshot and reactive access to the music catalog.
#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Current catalog snapshot.
    async fn tracks(&self) -> Result<Vec<Track>>;

    /// Live catalog view, refreshed whenever the catalog changes.
    fn observe_tracks(&self) -> LiveSubscription<Vec<Track>>;
}

/// Library source backed by the `tracks` table.
pub struct SqliteLibrarySource {
    repository: Arc<dyn TrackRepository>,
    tracks: SharedQuery<Vec<Track>>,
    event_bus: Option<EventBus>,
}

impl SqliteLibrarySource {
    pub fn new(
        repository: Arc<dyn TrackRepository>,
        tracker: InvalidationTracker,
        grace_period: Duration,
    ) -> Self {
        let tracks = {
            let repository = Arc::clone(&repository);
            SharedQuery::new("library_tracks", Table::Tracks, tracker, grace_period, move || {
                let repository = Arc::clone(&repository);
                async move { repository.list_all().await }
            })
        };

        Self {
            repository,
            tracks,
            event_bus: None,
        }
    }

    /// Emit [`LibraryEvent`]s on `bus` after catalog changes.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn repository(&self) -> &Arc<dyn TrackRepository> {
        &self.repository
    }

    /// Replace the catalog with a fresh scan.
    ///
    /// Playlist membership is left alone: rows for tracks that disappeared
    /// stop resolving and resolve again if the track comes back.
    #[instrument(skip(self, tracks), fields(count = tracks.len()))]
    pub async fn sync(&self, tracks: &[Track]) -> Result<SyncSummary> {
        let summary = self.repository.replace_all(tracks).await?;

        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "Library synced"
        );

        self.emit(LibraryEvent::Synced {
            added: summary.added,
            updated: summary.updated,
            removed: summary.removed,
        });
        Ok(summary)
    }

    /// Remove a single track whose media disappeared.
    pub async fn remove(&self, uri: &str) -> Result<bool> {
        let removed = self.repository.delete_by_uri(uri).await?;
        if removed {
            self.emit(LibraryEvent::TrackRemoved {
                uri: uri.to_string(),
            });
        }
        Ok(removed)
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }
}

#[async_trait]
impl LibrarySource for SqliteLibrarySource {
    async fn tracks(&self) -> Result<Vec<Track>> {
        self.repository.list_all().await
    }

    fn observe_tracks(&self) -> LiveSubscription<Vec<Track>> {
        self.tracks.subscribe()
    }
}
