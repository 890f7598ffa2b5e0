//! # Playlist Manager
//!
//! Playlist operations over the membership join table, resolved against the
//! [`LibrarySource`].
//!
//! ## Mutations
//!
//! Every mutation is spawned onto the Tokio runtime and returns immediately
//! with a [`PendingMutation`] handle. Await [`PendingMutation::wait`] to
//! observe the result, or drop the handle to fire and forget. Failures are
//! logged by the background task either way.
//!
//! ## Reads
//!
//! - [`PlaylistManager::get_playlist_songs`] resolves a snapshot
//! - [`PlaylistManager::playlist_with_songs`] and
//!   [`PlaylistManager::playlists_with_info`] return live views that refresh
//!   when playlists, membership or the library change
//!
//! Membership URIs that do not match a library track are left out of every
//! resolved result.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = PlaylistManager::new(store, library, tracker, Duration::from_secs(5));
//!
//! let id = manager.create_playlist("Road Trip").wait().await?;
//! manager.add_music_to_playlist("file:///music/song.mp3", id).detach();
//!
//! let mut playlists = manager.playlists_with_info();
//! while let Some(list) = playlists.next().await {
//!     render(list);
//! }
//! ```

use crate::error::{LibraryError, Result};
use crate::invalidation::{InvalidationTracker, Table, TableSet};
use crate::library::LibrarySource;
use crate::live::{LiveSubscription, SharedQuery};
use crate::models::{Playlist, PlaylistInfo, Track};
use crate::repositories::PlaylistRepository;
use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, Instrument};

const PLAYLIST_TABLES: TableSet = TableSet::of(Table::Playlists).with(Table::PlaylistTracks);
const PLAYLIST_VIEW_TABLES: TableSet = PLAYLIST_TABLES.with(Table::Tracks);

/// Handle on a mutation running in the background.
///
/// Dropping the handle detaches the mutation; it still runs to completion.
#[must_use = "call `wait()` for the result or `detach()` to fire and forget"]
pub struct PendingMutation<T> {
    operation: &'static str,
    handle: JoinHandle<Result<T>>,
}

impl<T> PendingMutation<T> {
    /// Wait for the mutation to finish.
    pub async fn wait(self) -> Result<T> {
        let PendingMutation { operation, handle } = self;
        handle
            .await
            .map_err(|e| LibraryError::TaskFailed(format!("{}: {}", operation, e)))?
    }

    /// Let the mutation finish on its own.
    pub fn detach(self) {}

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl<T> std::fmt::Debug for PendingMutation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMutation")
            .field("operation", &self.operation)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Playlist operations and live playlist views.
pub struct PlaylistManager {
    store: Arc<dyn PlaylistRepository>,
    library: Arc<dyn LibrarySource>,
    tracker: InvalidationTracker,
    event_bus: Option<EventBus>,
    grace_period: Duration,
    playlists: SharedQuery<Vec<PlaylistInfo>>,
    playlist_views: Mutex<HashMap<i64, SharedQuery<Option<Playlist>>>>,
}

impl PlaylistManager {
    /// Create a manager.
    ///
    /// # Arguments
    ///
    /// * `store` - Playlist persistence, reporting writes to `tracker`
    /// * `library` - Catalog that member URIs are resolved against
    /// * `tracker` - Shared invalidation source
    /// * `grace_period` - How long live views outlive their last subscriber
    pub fn new(
        store: Arc<dyn PlaylistRepository>,
        library: Arc<dyn LibrarySource>,
        tracker: InvalidationTracker,
        grace_period: Duration,
    ) -> Self {
        let playlists = {
            let store = Arc::clone(&store);
            SharedQuery::new(
                "playlists_with_info",
                PLAYLIST_TABLES,
                tracker.clone(),
                grace_period,
                move || {
                    let store = Arc::clone(&store);
                    async move { store.list_with_counts().await }
                },
            )
        };

        Self {
            store,
            library,
            tracker,
            event_bus: None,
            grace_period,
            playlists,
            playlist_views: Mutex::new(HashMap::new()),
        }
    }

    /// Emit [`PlaylistEvent`]s on `bus` after successful mutations.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Create an empty playlist. Names need not be unique.
    pub fn create_playlist(&self, name: impl Into<String>) -> PendingMutation<i64> {
        let name = name.into();
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("create_playlist", async move {
            let playlist_id = store.insert(&name).await?;
            emit(&events, PlaylistEvent::Created { playlist_id, name });
            Ok(playlist_id)
        })
    }

    /// Create a playlist already holding `uris`.
    ///
    /// Creation and linking share one transaction, so a failure leaves no
    /// playlist behind.
    pub fn create_playlist_and_add_songs(
        &self,
        name: impl Into<String>,
        uris: Vec<String>,
    ) -> PendingMutation<i64> {
        let name = name.into();
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("create_playlist_and_add_songs", async move {
            let playlist_id = store.insert_with_tracks(&name, &uris).await?;
            let count = uris.iter().collect::<HashSet<_>>().len() as u64;

            emit(&events, PlaylistEvent::Created { playlist_id, name });
            if count > 0 {
                emit(&events, PlaylistEvent::TracksAdded { playlist_id, count });
            }
            Ok(playlist_id)
        })
    }

    /// Add one track to a playlist. Adding a member twice is a no-op.
    ///
    /// Resolves to the number of newly linked tracks (0 or 1).
    pub fn add_music_to_playlist(
        &self,
        uri: impl Into<String>,
        playlist_id: i64,
    ) -> PendingMutation<u64> {
        let uris = vec![uri.into()];
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("add_music_to_playlist", async move {
            let count = store.add_tracks(playlist_id, &uris).await?;
            if count > 0 {
                emit(&events, PlaylistEvent::TracksAdded { playlist_id, count });
            }
            Ok(count)
        })
    }

    /// Add every track to every playlist.
    ///
    /// Resolves to the total number of new membership rows.
    pub fn add_music_to_playlists(
        &self,
        uris: Vec<String>,
        playlist_ids: Vec<i64>,
    ) -> PendingMutation<u64> {
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("add_music_to_playlists", async move {
            let linked = store.add_tracks_to_many(&playlist_ids, &uris).await?;

            let mut total = 0;
            for (playlist_id, count) in linked {
                total += count;
                if count > 0 {
                    emit(&events, PlaylistEvent::TracksAdded { playlist_id, count });
                }
            }
            Ok(total)
        })
    }

    /// Remove tracks from a playlist. URIs that are not members are ignored.
    pub fn remove_music_from_playlist(
        &self,
        playlist_id: i64,
        uris: Vec<String>,
    ) -> PendingMutation<u64> {
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("remove_music_from_playlist", async move {
            let count = store.remove_tracks(playlist_id, &uris).await?;
            if count > 0 {
                emit(&events, PlaylistEvent::TracksRemoved { playlist_id, count });
            }
            Ok(count)
        })
    }

    /// Delete a playlist and its membership.
    ///
    /// Resolves to `false` when there was no such playlist.
    pub fn delete_playlist(&self, playlist_id: i64) -> PendingMutation<bool> {
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("delete_playlist", async move {
            let deleted = store.delete(playlist_id).await?;
            if deleted {
                emit(&events, PlaylistEvent::Deleted { playlist_id });
            }
            Ok(deleted)
        })
    }

    /// Rename a playlist. The last rename to complete wins.
    ///
    /// Resolves to `false` when there was no such playlist.
    pub fn rename_playlist(
        &self,
        playlist_id: i64,
        new_name: impl Into<String>,
    ) -> PendingMutation<bool> {
        let name = new_name.into();
        let store = Arc::clone(&self.store);
        let events = self.event_bus.clone();

        self.launch("rename_playlist", async move {
            let renamed = store.rename(playlist_id, &name).await?;
            if renamed {
                emit(&events, PlaylistEvent::Renamed { playlist_id, name });
            }
            Ok(renamed)
        })
    }

    fn launch<T, F>(&self, operation: &'static str, mutation: F) -> PendingMutation<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let span = info_span!("playlist_mutation", operation);
        let handle = tokio::spawn(
            async move {
                let result = mutation.await;
                match &result {
                    Ok(_) => debug!("Playlist mutation completed"),
                    Err(e) => error!(error = %e, "Playlist mutation failed"),
                }
                result
            }
            .instrument(span),
        );

        PendingMutation { operation, handle }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Member tracks of a playlist, in membership order, resolved against
    /// the current library snapshot.
    ///
    /// A missing playlist yields an empty list.
    pub async fn get_playlist_songs(&self, playlist_id: i64) -> Result<Vec<Track>> {
        resolve_members(self.store.as_ref(), self.library.as_ref(), playlist_id).await
    }

    /// One-shot read of a playlist with its resolved tracks.
    pub async fn get_playlist(&self, playlist_id: i64) -> Result<Option<Playlist>> {
        load_playlist(self.store.as_ref(), self.library.as_ref(), playlist_id).await
    }

    /// Live view of one playlist with its resolved tracks.
    ///
    /// Publishes `None` while the playlist does not exist.
    pub fn playlist_with_songs(&self, playlist_id: i64) -> LiveSubscription<Option<Playlist>> {
        let mut views = self
            .playlist_views
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        views.retain(|_, view| view.subscriber_count() > 0 || view.is_active());

        let view = views
            .entry(playlist_id)
            .or_insert_with(|| self.playlist_view(playlist_id));
        view.subscribe()
    }

    /// Live view of every playlist with its member count, in id order.
    pub fn playlists_with_info(&self) -> LiveSubscription<Vec<PlaylistInfo>> {
        self.playlists.subscribe()
    }

    fn playlist_view(&self, playlist_id: i64) -> SharedQuery<Option<Playlist>> {
        let store = Arc::clone(&self.store);
        let library = Arc::clone(&self.library);

        SharedQuery::new(
            format!("playlist_with_songs:{}", playlist_id),
            PLAYLIST_VIEW_TABLES,
            self.tracker.clone(),
            self.grace_period,
            move || {
                let store = Arc::clone(&store);
                let library = Arc::clone(&library);
                async move { load_playlist(store.as_ref(), library.as_ref(), playlist_id).await }
            },
        )
    }
}

async fn load_playlist(
    store: &dyn PlaylistRepository,
    library: &dyn LibrarySource,
    playlist_id: i64,
) -> Result<Option<Playlist>> {
    let Some(info) = store.find_info(playlist_id).await? else {
        return Ok(None);
    };
    let tracks = resolve_members(store, library, playlist_id).await?;
    Ok(Some(Playlist { info, tracks }))
}

async fn resolve_members(
    store: &dyn PlaylistRepository,
    library: &dyn LibrarySource,
    playlist_id: i64,
) -> Result<Vec<Track>> {
    let uris = store.track_uris(playlist_id).await?;
    if uris.is_empty() {
        return Ok(Vec::new());
    }

    let catalog = library.tracks().await?;
    let mut by_uri: HashMap<&str, &Track> = HashMap::with_capacity(catalog.len());
    for track in &catalog {
        by_uri.insert(track.uri.as_str(), track);
    }

    Ok(uris
        .iter()
        .filter_map(|uri| by_uri.get(uri.as_str()).map(|track| (*track).clone()))
        .collect())
}

fn emit(events: &Option<EventBus>, event: PlaylistEvent) {
    if let Some(bus) = events {
        bus.emit(CoreEvent::Playlist(event)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::playlist::MockPlaylistRepository;
    use async_trait::async_trait;

    struct StaticLibrary {
        tracks: Vec<Track>,
    }

    #[async_trait]
    impl LibrarySource for StaticLibrary {
        async fn tracks(&self) -> Result<Vec<Track>> {
            Ok(self.tracks.clone())
        }

        fn observe_tracks(&self) -> LiveSubscription<Vec<Track>> {
            let tracks = self.tracks.clone();
            SharedQuery::new(
                "static",
                Table::Tracks,
                InvalidationTracker::new(),
                Duration::ZERO,
                move || {
                    let tracks = tracks.clone();
                    async move { Ok(tracks) }
                },
            )
            .subscribe()
        }
    }

    fn track(n: u32) -> Track {
        Track::new(
            format!("id-{}", n),
            format!("file:///{}.mp3", n),
            format!("Song {}", n),
            "Artist",
            1_000,
        )
    }

    fn manager(store: MockPlaylistRepository, tracks: Vec<Track>) -> PlaylistManager {
        PlaylistManager::new(
            Arc::new(store),
            Arc::new(StaticLibrary { tracks }),
            InvalidationTracker::new(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_through_handle() {
        let mut store = MockPlaylistRepository::new();
        store
            .expect_insert()
            .returning(|_| Err(LibraryError::Database(sqlx::Error::PoolTimedOut)));

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let manager = manager(store, vec![]).with_event_bus(bus);

        let result = manager.create_playlist("Mix").wait().await;
        assert!(matches!(result, Err(LibraryError::Database(_))));
        assert!(rx.try_recv().is_err(), "no event on failure");
    }

    #[tokio::test]
    async fn test_create_emits_event() {
        let mut store = MockPlaylistRepository::new();
        store.expect_insert().returning(|_| Ok(7));

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let manager = manager(store, vec![]).with_event_bus(bus);

        assert_eq!(manager.create_playlist("Mix").wait().await.unwrap(), 7);
        match rx.recv().await.unwrap() {
            CoreEvent::Playlist(PlaylistEvent::Created { playlist_id, name }) => {
                assert_eq!(playlist_id, 7);
                assert_eq!(name, "Mix");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detached_mutation_still_runs() {
        let mut store = MockPlaylistRepository::new();
        store.expect_rename().times(1).returning(|_, _| Ok(true));

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let manager = manager(store, vec![]).with_event_bus(bus);

        manager.rename_playlist(3, "Renamed").detach();
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            CoreEvent::Playlist(PlaylistEvent::Renamed { playlist_id: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_add_to_many_reports_per_playlist() {
        let mut store = MockPlaylistRepository::new();
        store
            .expect_add_tracks_to_many()
            .returning(|ids, uris| Ok(ids.iter().map(|id| (*id, uris.len() as u64)).collect()));

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let manager = manager(store, vec![]).with_event_bus(bus);

        let total = manager
            .add_music_to_playlists(vec!["a".into(), "b".into()], vec![1, 2])
            .wait()
            .await
            .unwrap();
        assert_eq!(total, 4);

        for expected in [1, 2] {
            match rx.recv().await.unwrap() {
                CoreEvent::Playlist(PlaylistEvent::TracksAdded { playlist_id, count }) => {
                    assert_eq!(playlist_id, expected);
                    assert_eq!(count, 2);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_get_playlist_songs_drops_unknown_uris() {
        let mut store = MockPlaylistRepository::new();
        store.expect_track_uris().returning(|_| {
            Ok(vec![
                "file:///2.mp3".to_string(),
                "file:///gone.mp3".to_string(),
                "file:///1.mp3".to_string(),
            ])
        });

        let manager = manager(store, vec![track(1), track(2)]);
        let songs = manager.get_playlist_songs(1).await.unwrap();

        let titles: Vec<&str> = songs.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Song 2", "Song 1"]);
    }

    #[tokio::test]
    async fn test_playlist_view_for_missing_playlist() {
        let mut store = MockPlaylistRepository::new();
        store.expect_find_info().returning(|_| Ok(None));

        let manager = manager(store, vec![]);
        let mut view = manager.playlist_with_songs(99);

        assert_eq!(view.first().await, Some(None));
    }

    #[tokio::test]
    async fn test_views_for_same_playlist_are_shared() {
        let mut store = MockPlaylistRepository::new();
        store.expect_find_info().times(1).returning(|id| {
            Ok(Some(PlaylistInfo {
                id,
                name: "Mix".to_string(),
                number_of_music: 0,
            }))
        });
        store.expect_track_uris().times(1).returning(|_| Ok(vec![]));

        let manager = manager(store, vec![]);
        let mut a = manager.playlist_with_songs(1);
        let mut b = manager.playlist_with_songs(1);

        let first = a.first().await.unwrap().unwrap();
        assert_eq!(first.name(), "Mix");
        assert_eq!(b.first().await.unwrap().unwrap().id(), 1);
    }
}
