//! Lyrics repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::invalidation::{InvalidationTracker, Table};
use crate::models::Lyrics;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Lyrics cache interface
#[async_trait]
pub trait LyricsRepository: Send + Sync {
    /// Find cached lyrics by track URI
    ///
    /// # Returns
    /// - `Ok(Some(lyrics))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_track_uri(&self, track_uri: &str) -> Result<Option<Lyrics>>;

    /// Store lyrics, replacing any cached entry for the same track
    ///
    /// # Errors
    /// Returns error if:
    /// - Lyrics validation fails
    /// - Database error occurs
    async fn upsert(&self, lyrics: &Lyrics) -> Result<()>;

    /// Delete cached lyrics by track URI
    ///
    /// # Returns
    /// - `Ok(true)` if lyrics were deleted
    /// - `Ok(false)` if lyrics were not found
    async fn delete(&self, track_uri: &str) -> Result<bool>;

    /// Count cached lyrics
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of LyricsRepository
pub struct SqliteLyricsRepository {
    pool: SqlitePool,
    tracker: InvalidationTracker,
}

impl SqliteLyricsRepository {
    /// Create a new SqliteLyricsRepository
    pub fn new(pool: SqlitePool, tracker: InvalidationTracker) -> Self {
        Self { pool, tracker }
    }
}

#[async_trait]
impl LyricsRepository for SqliteLyricsRepository {
    async fn find_by_track_uri(&self, track_uri: &str) -> Result<Option<Lyrics>> {
        let lyrics = query_as::<_, Lyrics>("SELECT * FROM lyrics WHERE track_uri = ?")
            .bind(track_uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lyrics)
    }

    async fn upsert(&self, lyrics: &Lyrics) -> Result<()> {
        lyrics.validate().map_err(|e| LibraryError::InvalidInput {
            field: "Lyrics".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO lyrics (track_uri, source, synced, body, fetched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(track_uri) DO UPDATE SET
                source = excluded.source,
                synced = excluded.synced,
                body = excluded.body,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&lyrics.track_uri)
        .bind(&lyrics.source)
        .bind(lyrics.synced)
        .bind(&lyrics.body)
        .bind(lyrics.fetched_at)
        .execute(&self.pool)
        .await?;

        self.tracker.notify(Table::Lyrics);
        Ok(())
    }

    async fn delete(&self, track_uri: &str) -> Result<bool> {
        let result = query("DELETE FROM lyrics WHERE track_uri = ?")
            .bind(track_uri)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.tracker.notify(Table::Lyrics);
        }
        Ok(deleted)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM lyrics")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}
