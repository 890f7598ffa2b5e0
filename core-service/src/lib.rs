//! Core service façade and bootstrap helpers.
//!
//! This crate wires the shared Rust core together from a [`CoreConfig`]: the
//! SQLite pool, the invalidation tracker that drives live views, the event
//! bus, the library source, the playlist manager and the lyrics service.
//! Hosts hold one [`CoreService`] and reach every component through it.
//!
//! Network lyrics lookups are only compiled in with the `lyrics` feature;
//! without it the lyrics service still answers from embedded tags and the
//! local cache.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder().database_path("music.db").build()?;
//! let core = CoreService::bootstrap(config).await?;
//!
//! core.scan_library("/home/me/Music".as_ref()).await?;
//! let mut playlists = core.playlists().playlists_with_info();
//! # let _ = playlists.first().await;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::SyncSummary;
use core_library::repositories::{
    LyricsRepository, SqliteLyricsRepository, SqlitePlaylistRepository, SqliteTrackRepository,
    TrackRepository,
};
use core_library::{InvalidationTracker, LibraryError, PlaylistManager, SqliteLibrarySource};
use core_metadata::{LibraryScanner, LyricsOutcome, LyricsService};
use core_playback::MusicQueue;
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::init_logging;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

/// Every component the core is built from.
pub struct CoreComponents {
    pub config: CoreConfig,
    pub pool: SqlitePool,
    pub tracker: InvalidationTracker,
    pub events: EventBus,
    pub library: Arc<SqliteLibrarySource>,
    pub playlists: Arc<PlaylistManager>,
    pub lyrics: Arc<LyricsService>,
    pub scanner: LibraryScanner,
}

/// Result of [`CoreService::scan_library`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryScan {
    /// Catalog changes applied by the scan
    pub summary: SyncSummary,
    /// Audio files that could not be read
    pub skipped: Vec<PathBuf>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    components: Arc<CoreComponents>,
}

impl CoreService {
    /// Validate `config`, install logging if configured, open the database
    /// and build every component.
    ///
    /// A subscriber installed earlier by the host is kept; the configured
    /// one is then skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, when the database cannot be opened or
    /// migrated, or when the lyrics provider cannot be constructed.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        if let Some(logging) = &config.logging {
            if let Err(e) = init_logging(logging.clone()) {
                warn!(error = %e, "Keeping the existing tracing subscriber");
            }
        }

        let pool = create_pool(DatabaseConfig::from_path(&config.database_path)).await?;
        let tracker = InvalidationTracker::new();
        let events = EventBus::new(config.event_buffer_size);
        let grace_period = config.sharing_grace_period;

        let tracks = Arc::new(SqliteTrackRepository::new(pool.clone(), tracker.clone()));
        let library = Arc::new(
            SqliteLibrarySource::new(tracks, tracker.clone(), grace_period)
                .with_event_bus(events.clone()),
        );

        let store = Arc::new(SqlitePlaylistRepository::new(pool.clone(), tracker.clone()));
        let playlists = Arc::new(
            PlaylistManager::new(store, library.clone(), tracker.clone(), grace_period)
                .with_event_bus(events.clone()),
        );

        let lyrics_cache = Arc::new(SqliteLyricsRepository::new(pool.clone(), tracker.clone()));
        let lyrics = Arc::new(build_lyrics_service(&config, lyrics_cache)?);

        info!(
            in_memory = config.is_in_memory(),
            lyrics_providers = lyrics.provider_count(),
            "Core service ready"
        );

        Ok(Self::new(CoreComponents {
            config,
            pool,
            tracker,
            events,
            library,
            playlists,
            lyrics,
            scanner: LibraryScanner::new(),
        }))
    }

    /// Create a service from already-built components.
    pub fn new(components: CoreComponents) -> Self {
        Self {
            components: Arc::new(components),
        }
    }

    /// Access the components being used by the service.
    pub fn components(&self) -> Arc<CoreComponents> {
        Arc::clone(&self.components)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.components.config
    }

    pub fn library(&self) -> &Arc<SqliteLibrarySource> {
        &self.components.library
    }

    pub fn playlists(&self) -> &Arc<PlaylistManager> {
        &self.components.playlists
    }

    pub fn lyrics(&self) -> &Arc<LyricsService> {
        &self.components.lyrics
    }

    pub fn events(&self) -> &EventBus {
        &self.components.events
    }

    /// Stream of library and playlist events. Past events are not replayed.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.components.events.subscribe())
    }

    /// Scan `dir` and replace the library catalog with what was found.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn scan_library(&self, dir: &Path) -> Result<LibraryScan> {
        let report = self.components.scanner.scan(dir).await?;
        let summary = self.components.library.sync(&report.tracks).await?;

        Ok(LibraryScan {
            summary,
            skipped: report.skipped,
        })
    }

    /// Build a play queue from a playlist's resolved tracks, starting at
    /// `start_index` (clamped).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PlaylistNotFound`] when the playlist is missing.
    pub async fn queue_from_playlist(
        &self,
        playlist_id: i64,
        start_index: usize,
    ) -> Result<MusicQueue> {
        let playlist = self
            .components
            .playlists
            .get_playlist(playlist_id)
            .await?
            .ok_or(CoreError::PlaylistNotFound(playlist_id))?;

        Ok(MusicQueue::from_tracks(playlist.tracks, start_index))
    }

    /// Look up lyrics for a library track.
    pub async fn lookup_lyrics(&self, track_uri: &str) -> Result<LyricsOutcome> {
        let track = self
            .components
            .library
            .repository()
            .find_by_uri(track_uri)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Track".to_string(),
                id: track_uri.to_string(),
            })?;

        Ok(self.components.lyrics.lookup(&track).await?)
    }

    /// Close the database pool. Live views stop refreshing afterwards.
    pub async fn shutdown(&self) {
        self.components.pool.close().await;
        info!("Core service shut down");
    }
}

#[cfg(feature = "lyrics")]
fn build_lyrics_service(
    config: &CoreConfig,
    cache: Arc<dyn LyricsRepository>,
) -> Result<LyricsService> {
    Ok(LyricsService::from_config(&config.lyrics, cache)?)
}

#[cfg(not(feature = "lyrics"))]
fn build_lyrics_service(
    config: &CoreConfig,
    cache: Arc<dyn LyricsRepository>,
) -> Result<LyricsService> {
    use core_metadata::lyrics::TagLyricsReader;

    if config.lyrics.enabled {
        warn!("Network lyrics requested but the `lyrics` feature is not compiled in");
    }
    Ok(LyricsService::new(cache).with_embedded_reader(Arc::new(TagLyricsReader::new())))
}
