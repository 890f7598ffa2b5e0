//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Every successful write reports the touched tables to the shared
//!   [`InvalidationTracker`](crate::invalidation::InvalidationTracker)
//! - Multi-step writes run inside a single transaction
//!
//! ## Available Repositories
//!
//! - `TrackRepository` - The library catalog, keyed by URI
//! - `PlaylistRepository` - Playlists and their membership join table
//! - `LyricsRepository` - Cached lyrics (plain text and synced LRC format)

pub mod lyrics;
pub mod playlist;
pub mod track;

pub use lyrics::{LyricsRepository, SqliteLyricsRepository};
pub use playlist::{PlaylistRepository, SqlitePlaylistRepository};
pub use track::{SqliteTrackRepository, TrackRepository};
