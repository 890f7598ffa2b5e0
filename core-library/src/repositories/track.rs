//! Track repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::invalidation::{InvalidationTracker, Table};
use crate::models::{SyncSummary, Track};
use async_trait::async_trait;
use sqlx::{query, query_as, Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Track repository interface for data access operations
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its URI
    ///
    /// # Returns
    /// - `Ok(Some(track))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_uri(&self, uri: &str) -> Result<Option<Track>>;

    /// All tracks ordered by title
    async fn list_all(&self) -> Result<Vec<Track>>;

    /// Insert a track or update the one with the same URI
    ///
    /// The original `date_added` is kept on update.
    async fn upsert(&self, track: &Track) -> Result<()>;

    /// Delete a track by URI
    ///
    /// # Returns
    /// - `Ok(true)` if the track was deleted
    /// - `Ok(false)` if the track was not found
    async fn delete_by_uri(&self, uri: &str) -> Result<bool>;

    /// Replace the whole catalog with `tracks` in one transaction
    ///
    /// Tracks present in both are updated when their metadata differs,
    /// tracks missing from `tracks` are deleted. Later duplicates of a URI
    /// win.
    async fn replace_all(&self, tracks: &[Track]) -> Result<SyncSummary>;

    /// Count total tracks
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
    tracker: InvalidationTracker,
}

impl SqliteTrackRepository {
    /// Create a new SqliteTrackRepository
    pub fn new(pool: SqlitePool, tracker: InvalidationTracker) -> Self {
        Self { pool, tracker }
    }
}

fn validate(track: &Track) -> Result<()> {
    track.validate().map_err(|e| LibraryError::InvalidInput {
        field: "Track".to_string(),
        message: e,
    })
}

async fn insert_track(tx: &mut Transaction<'_, Sqlite>, track: &Track) -> Result<()> {
    query(
        r#"
        INSERT INTO tracks (id, uri, title, artist, album, duration_ms, album_art_uri, date_added)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&track.id)
    .bind(&track.uri)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(track.duration_ms)
    .bind(&track.album_art_uri)
    .bind(track.date_added)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn update_track(tx: &mut Transaction<'_, Sqlite>, track: &Track) -> Result<()> {
    query(
        r#"
        UPDATE tracks
        SET id = ?, title = ?, artist = ?, album = ?, duration_ms = ?, album_art_uri = ?
        WHERE uri = ?
        "#,
    )
    .bind(&track.id)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(track.duration_ms)
    .bind(&track.album_art_uri)
    .bind(&track.uri)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_uri(&self, uri: &str) -> Result<Option<Track>> {
        let track = query_as::<_, Track>("SELECT * FROM tracks WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(track)
    }

    async fn list_all(&self) -> Result<Vec<Track>> {
        let tracks =
            query_as::<_, Track>("SELECT * FROM tracks ORDER BY title COLLATE NOCASE ASC, uri ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(tracks)
    }

    async fn upsert(&self, track: &Track) -> Result<()> {
        validate(track)?;

        query(
            r#"
            INSERT INTO tracks (id, uri, title, artist, album, duration_ms, album_art_uri, date_added)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uri) DO UPDATE SET
                id = excluded.id,
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                duration_ms = excluded.duration_ms,
                album_art_uri = excluded.album_art_uri
            "#,
        )
        .bind(&track.id)
        .bind(&track.uri)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(&track.album)
        .bind(track.duration_ms)
        .bind(&track.album_art_uri)
        .bind(track.date_added)
        .execute(&self.pool)
        .await?;

        self.tracker.notify(Table::Tracks);
        Ok(())
    }

    async fn delete_by_uri(&self, uri: &str) -> Result<bool> {
        let result = query("DELETE FROM tracks WHERE uri = ?")
            .bind(uri)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.tracker.notify(Table::Tracks);
        }
        Ok(deleted)
    }

    async fn replace_all(&self, tracks: &[Track]) -> Result<SyncSummary> {
        for track in tracks {
            validate(track)?;
        }

        let mut incoming: HashMap<&str, &Track> = HashMap::with_capacity(tracks.len());
        for track in tracks {
            incoming.insert(track.uri.as_str(), track);
        }

        let mut tx = self.pool.begin().await?;

        let existing: HashMap<String, Track> = query_as::<_, Track>("SELECT * FROM tracks")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|track| (track.uri.clone(), track))
            .collect();

        let mut summary = SyncSummary::default();

        // Remove first so a file that moved can take over its old id
        let keep: HashSet<&str> = incoming.keys().copied().collect();
        for uri in existing.keys() {
            if !keep.contains(uri.as_str()) {
                query("DELETE FROM tracks WHERE uri = ?")
                    .bind(uri)
                    .execute(&mut *tx)
                    .await?;
                summary.removed += 1;
            }
        }

        for track in tracks {
            // Only the last occurrence of a URI is applied
            let is_winner = incoming
                .get(track.uri.as_str())
                .is_some_and(|winner| std::ptr::eq(*winner, track));
            if !is_winner {
                continue;
            }

            match existing.get(&track.uri) {
                None => {
                    insert_track(&mut tx, track).await?;
                    summary.added += 1;
                }
                Some(current) if !current.same_metadata(track) => {
                    update_track(&mut tx, track).await?;
                    summary.updated += 1;
                }
                Some(_) => {}
            }
        }

        tx.commit().await?;

        debug!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "Catalog replaced"
        );

        if !summary.is_empty() {
            self.tracker.notify(Table::Tracks);
        }
        Ok(summary)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM tracks")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
