//! # Library Management Module
//!
//! Owns the music library database and the playlist data model built on it.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repository patterns for tracks, playlists and the lyrics cache
//! - Table invalidation tracking so writes refresh live views
//! - Shared live queries that stay active while subscribed, plus a grace period
//! - The library source consumed by playlists and the playback queue
//! - The playlist manager: non-blocking mutations and reactive reads

pub mod db;
pub mod error;
pub mod invalidation;
pub mod library;
pub mod live;
pub mod models;
pub mod playlists;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use invalidation::{InvalidationTracker, Table, TableSet};
pub use library::{LibrarySource, SqliteLibrarySource};
pub use live::{LiveSubscription, SharedQuery};
pub use models::{Lyrics, Playlist, PlaylistInfo, PlaylistTrack, SyncSummary, Track};
pub use playlists::{PendingMutation, PlaylistManager};
