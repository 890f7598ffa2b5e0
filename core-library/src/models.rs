//! Domain models for the music library
//!
//! Tracks are immutable catalog entries; playlists reference them by URI so
//! that membership survives a track temporarily disappearing from the device.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// Tracks
// =============================================================================

/// Playable audio item with metadata.
///
/// Created by library sync, never mutated afterwards, removed when the
/// underlying media disappears.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Track {
    /// Identifier, stable for a given source file
    pub id: String,
    /// Playable source reference (path or URI), the natural key
    pub uri: String,
    /// Track title
    pub title: String,
    /// Track artist
    pub artist: String,
    /// Album name
    pub album: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: i64,
    /// Album art reference
    pub album_art_uri: Option<String>,
    /// When the track entered the catalog (unix seconds)
    pub date_added: i64,
}

impl Track {
    /// Create a new track with the required metadata
    pub fn new(
        id: impl Into<String>,
        uri: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration_ms,
            album_art_uri: None,
            date_added: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_album_art(mut self, uri: impl Into<String>) -> Self {
        self.album_art_uri = Some(uri.into());
        self
    }

    /// Validate track data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }

        if self.uri.trim().is_empty() {
            return Err("Track uri cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }

        if self.duration_ms < 0 {
            return Err("Track duration cannot be negative".to_string());
        }

        Ok(())
    }

    /// Whether two catalog entries describe the same media identically,
    /// ignoring when they were added.
    pub fn same_metadata(&self, other: &Track) -> bool {
        self.id == other.id
            && self.uri == other.uri
            && self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.duration_ms == other.duration_ms
            && self.album_art_uri == other.album_art_uri
    }

    /// Duration in whole seconds, as used by lyrics lookups
    pub fn duration_secs(&self) -> u32 {
        (self.duration_ms.max(0) / 1000) as u32
    }
}

/// Outcome of replacing the catalog with a fresh scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
}

impl SyncSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

// =============================================================================
// Playlists
// =============================================================================

/// Playlist metadata with its live member count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct PlaylistInfo {
    /// Unique identifier (assigned by storage)
    pub id: i64,
    /// Playlist name, not unique
    pub name: String,
    /// Number of membership rows, including ones whose track is gone
    pub number_of_music: i64,
}

/// Playlist with its materialized member tracks.
///
/// Tracks appear in membership insertion order. Members whose URI no longer
/// resolves to a library track are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub info: PlaylistInfo,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn id(&self) -> i64 {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Total duration of the resolved tracks in milliseconds
    pub fn total_duration_ms(&self) -> i64 {
        self.tracks.iter().map(|t| t.duration_ms).sum()
    }
}

/// Membership row linking a playlist to a track URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct PlaylistTrack {
    pub playlist_id: i64,
    pub track_uri: String,
    pub added_at: i64,
}

// =============================================================================
// Lyrics
// =============================================================================

/// Cached lyrics for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Lyrics {
    /// Track the lyrics belong to
    pub track_uri: String,
    /// Where the lyrics came from (embedded, lrclib, ...)
    pub source: String,
    /// Whether the body is synced LRC - SQLite stores 0 or 1
    pub synced: i64,
    /// Lyrics body (plain text or LRC)
    pub body: String,
    /// When the lyrics were stored (unix seconds)
    pub fetched_at: i64,
}

impl Lyrics {
    pub fn new(
        track_uri: impl Into<String>,
        source: impl Into<String>,
        synced: bool,
        body: impl Into<String>,
    ) -> Self {
        Self {
            track_uri: track_uri.into(),
            source: source.into(),
            synced: if synced { 1 } else { 0 },
            body: body.into(),
            fetched_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced != 0
    }

    /// Validate lyrics data
    pub fn validate(&self) -> Result<(), String> {
        if self.body.trim().is_empty() {
            return Err("Lyrics body cannot be empty".to_string());
        }

        if self.is_synced() && !self.body.contains('[') {
            return Err("Synced lyrics must be in LRC format".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
