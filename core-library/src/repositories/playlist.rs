//! Playlist repository trait and implementation
//!
//! Membership is stored in the `playlist_tracks` join table keyed by
//! `(playlist_id, track_uri)`. Member order is insertion order.

use crate::error::{LibraryError, Result};
use crate::invalidation::{InvalidationTracker, Table, TableSet};
use crate::models::PlaylistInfo;
use async_trait::async_trait;
use sqlx::{query, query_as, Sqlite, SqlitePool, Transaction};
use tracing::debug;

/// Playlist repository interface for data access operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    /// Insert a new, empty playlist and return its id
    async fn insert(&self, name: &str) -> Result<i64>;

    /// Insert a playlist and link `track_uris` to it in one transaction
    ///
    /// Nothing is persisted if any step fails.
    async fn insert_with_tracks(&self, name: &str, track_uris: &[String]) -> Result<i64>;

    /// Link tracks to a playlist, ignoring ones already linked
    ///
    /// # Returns
    /// Number of newly linked tracks
    ///
    /// # Errors
    /// Returns `NotFound` if the playlist does not exist
    async fn add_tracks(&self, playlist_id: i64, track_uris: &[String]) -> Result<u64>;

    /// Link every track to every playlist in one transaction
    ///
    /// # Returns
    /// Newly linked track count per playlist, in `playlist_ids` order
    async fn add_tracks_to_many(
        &self,
        playlist_ids: &[i64],
        track_uris: &[String],
    ) -> Result<Vec<(i64, u64)>>;

    /// Unlink tracks from a playlist
    ///
    /// # Returns
    /// Number of removed membership rows (0 when none matched)
    async fn remove_tracks(&self, playlist_id: i64, track_uris: &[String]) -> Result<u64>;

    /// Delete a playlist with all of its membership rows
    ///
    /// # Returns
    /// - `Ok(true)` if the playlist was deleted
    /// - `Ok(false)` if the playlist was not found
    async fn delete(&self, playlist_id: i64) -> Result<bool>;

    /// Rename a playlist
    ///
    /// # Returns
    /// - `Ok(true)` if the playlist was renamed
    /// - `Ok(false)` if the playlist was not found
    async fn rename(&self, playlist_id: i64, name: &str) -> Result<bool>;

    /// Playlist metadata with its member count
    async fn find_info(&self, playlist_id: i64) -> Result<Option<PlaylistInfo>>;

    /// All playlists with member counts, in id order
    async fn list_with_counts(&self) -> Result<Vec<PlaylistInfo>>;

    /// Member URIs in insertion order
    async fn track_uris(&self, playlist_id: i64) -> Result<Vec<String>>;

    /// Count total playlists
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PlaylistRepository
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
    tracker: InvalidationTracker,
}

impl SqlitePlaylistRepository {
    /// Create a new SqlitePlaylistRepository
    pub fn new(pool: SqlitePool, tracker: InvalidationTracker) -> Self {
        Self { pool, tracker }
    }
}

const MEMBERSHIP: TableSet = TableSet::of(Table::PlaylistTracks);
const PLAYLISTS_AND_MEMBERSHIP: TableSet =
    TableSet::of(Table::Playlists).with(Table::PlaylistTracks);

const INFO_COLUMNS: &str = r#"
    SELECT p.id AS id, p.name AS name, COUNT(pt.track_uri) AS number_of_music
    FROM playlists p
    LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
"#;

async fn create_playlist(tx: &mut Transaction<'_, Sqlite>, name: &str) -> Result<i64> {
    let result = query("INSERT INTO playlists (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut **tx)
        .await?;

    Ok(result.last_insert_rowid())
}

async fn ensure_playlist(tx: &mut Transaction<'_, Sqlite>, playlist_id: i64) -> Result<()> {
    let exists: Option<(i64,)> = query_as("SELECT id FROM playlists WHERE id = ?")
        .bind(playlist_id)
        .fetch_optional(&mut **tx)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(LibraryError::NotFound {
            entity_type: "Playlist".to_string(),
            id: playlist_id.to_string(),
        }),
    }
}

async fn link_tracks(
    tx: &mut Transaction<'_, Sqlite>,
    playlist_id: i64,
    track_uris: &[String],
) -> Result<u64> {
    let added_at = chrono::Utc::now().timestamp();
    let mut linked = 0;

    for uri in track_uris {
        let result = query(
            "INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_uri, added_at) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(uri)
        .bind(added_at)
        .execute(&mut **tx)
        .await?;
        linked += result.rows_affected();
    }

    Ok(linked)
}

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn insert(&self, name: &str) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = create_playlist(&mut tx, name).await?;
        tx.commit().await?;

        debug!(playlist_id = id, "Playlist inserted");
        self.tracker.notify(Table::Playlists);
        Ok(id)
    }

    async fn insert_with_tracks(&self, name: &str, track_uris: &[String]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = create_playlist(&mut tx, name).await?;
        let linked = link_tracks(&mut tx, id, track_uris).await?;
        tx.commit().await?;

        debug!(playlist_id = id, linked, "Playlist inserted with tracks");
        self.tracker.notify(PLAYLISTS_AND_MEMBERSHIP);
        Ok(id)
    }

    async fn add_tracks(&self, playlist_id: i64, track_uris: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        ensure_playlist(&mut tx, playlist_id).await?;
        let linked = link_tracks(&mut tx, playlist_id, track_uris).await?;
        tx.commit().await?;

        if linked > 0 {
            self.tracker.notify(MEMBERSHIP);
        }
        Ok(linked)
    }

    async fn add_tracks_to_many(
        &self,
        playlist_ids: &[i64],
        track_uris: &[String],
    ) -> Result<Vec<(i64, u64)>> {
        let mut tx = self.pool.begin().await?;
        let mut linked = Vec::with_capacity(playlist_ids.len());
        for &playlist_id in playlist_ids {
            ensure_playlist(&mut tx, playlist_id).await?;
            let count = link_tracks(&mut tx, playlist_id, track_uris).await?;
            linked.push((playlist_id, count));
        }
        tx.commit().await?;

        if linked.iter().any(|(_, count)| *count > 0) {
            self.tracker.notify(MEMBERSHIP);
        }
        Ok(linked)
    }

    async fn remove_tracks(&self, playlist_id: i64, track_uris: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for uri in track_uris {
            let result =
                query("DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_uri = ?")
                    .bind(playlist_id)
                    .bind(uri)
                    .execute(&mut *tx)
                    .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        if removed > 0 {
            self.tracker.notify(MEMBERSHIP);
        }
        Ok(removed)
    }

    async fn delete(&self, playlist_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Membership first; the cascade is not relied upon
        query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.tracker.notify(PLAYLISTS_AND_MEMBERSHIP);
        }
        Ok(deleted)
    }

    async fn rename(&self, playlist_id: i64, name: &str) -> Result<bool> {
        let result = query("UPDATE playlists SET name = ? WHERE id = ?")
            .bind(name)
            .bind(playlist_id)
            .execute(&self.pool)
            .await?;

        let renamed = result.rows_affected() > 0;
        if renamed {
            self.tracker.notify(Table::Playlists);
        }
        Ok(renamed)
    }

    async fn find_info(&self, playlist_id: i64) -> Result<Option<PlaylistInfo>> {
        let sql = format!("{} WHERE p.id = ? GROUP BY p.id", INFO_COLUMNS);
        let info = query_as::<_, PlaylistInfo>(&sql)
            .bind(playlist_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(info)
    }

    async fn list_with_counts(&self) -> Result<Vec<PlaylistInfo>> {
        let sql = format!("{} GROUP BY p.id ORDER BY p.id ASC", INFO_COLUMNS);
        let playlists = query_as::<_, PlaylistInfo>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(playlists)
    }

    async fn track_uris(&self, playlist_id: i64) -> Result<Vec<String>> {
        let uris = query_as::<_, (String,)>(
            "SELECT track_uri FROM playlist_tracks WHERE playlist_id = ? ORDER BY rowid ASC",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|(uri,)| uri).collect())?;

        Ok(uris)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM playlists")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn uris(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("file:///music/{}.mp3", n)).collect()
    }

    async fn setup() -> (SqlitePlaylistRepository, InvalidationTracker) {
        let pool = create_test_pool().await.unwrap();
        let tracker = InvalidationTracker::new();
        (SqlitePlaylistRepository::new(pool, tracker.clone()), tracker)
    }

    #[tokio::test]
    async fn test_insert_and_find_playlist() {
        let (repo, _) = setup().await;

        let id = repo.insert("Road Trip").await.unwrap();
        let info = repo.find_info(id).await.unwrap().unwrap();
        assert_eq!(info.name, "Road Trip");
        assert_eq!(info.number_of_music, 0);

        assert!(repo.find_info(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_allowed() {
        let (repo, _) = setup().await;
        let a = repo.insert("Mix").await.unwrap();
        let b = repo.insert("Mix").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_tracks_is_idempotent() {
        let (repo, _) = setup().await;
        let id = repo.insert("Mix").await.unwrap();

        assert_eq!(repo.add_tracks(id, &uris(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(repo.add_tracks(id, &uris(&["b", "c"])).await.unwrap(), 1);

        assert_eq!(repo.track_uris(id).await.unwrap(), uris(&["a", "b", "c"]));
        assert_eq!(repo.find_info(id).await.unwrap().unwrap().number_of_music, 3);
    }

    #[tokio::test]
    async fn test_add_tracks_to_missing_playlist() {
        let (repo, _) = setup().await;
        let result = repo.add_tracks(42, &uris(&["a"])).await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_add_tracks_to_many() {
        let (repo, _) = setup().await;
        let a = repo.insert("A").await.unwrap();
        let b = repo.insert("B").await.unwrap();

        let linked = repo
            .add_tracks_to_many(&[a, b], &uris(&["x", "y"]))
            .await
            .unwrap();
        assert_eq!(linked, vec![(a, 2), (b, 2)]);
        assert_eq!(repo.track_uris(b).await.unwrap(), uris(&["x", "y"]));
    }

    #[tokio::test]
    async fn test_add_tracks_to_many_rolls_back_on_missing_playlist() {
        let (repo, _) = setup().await;
        let a = repo.insert("A").await.unwrap();

        let result = repo.add_tracks_to_many(&[a, a + 50], &uris(&["x"])).await;
        assert!(result.is_err());
        assert!(repo.track_uris(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_with_tracks() {
        let (repo, _) = setup().await;
        let id = repo
            .insert_with_tracks("Favorites", &uris(&["a", "b", "a"]))
            .await
            .unwrap();

        assert_eq!(repo.track_uris(id).await.unwrap(), uris(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_remove_tracks() {
        let (repo, _) = setup().await;
        let id = repo.insert_with_tracks("Mix", &uris(&["a", "b", "c"])).await.unwrap();

        assert_eq!(repo.remove_tracks(id, &uris(&["a", "c", "zzz"])).await.unwrap(), 2);
        assert_eq!(repo.remove_tracks(id, &uris(&["a"])).await.unwrap(), 0);
        assert_eq!(repo.track_uris(id).await.unwrap(), uris(&["b"]));
    }

    #[tokio::test]
    async fn test_delete_removes_membership() {
        let (repo, _) = setup().await;
        let id = repo.insert_with_tracks("Mix", &uris(&["a", "b"])).await.unwrap();
        let other = repo.insert_with_tracks("Other", &uris(&["a"])).await.unwrap();

        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());

        assert!(repo.find_info(id).await.unwrap().is_none());
        assert!(repo.track_uris(id).await.unwrap().is_empty());
        assert_eq!(repo.track_uris(other).await.unwrap(), uris(&["a"]));
    }

    #[tokio::test]
    async fn test_rename() {
        let (repo, _) = setup().await;
        let id = repo.insert("Old").await.unwrap();

        assert!(repo.rename(id, "New").await.unwrap());
        assert_eq!(repo.find_info(id).await.unwrap().unwrap().name, "New");
        assert!(!repo.rename(id + 1, "Nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_with_counts_in_id_order() {
        let (repo, _) = setup().await;
        let first = repo.insert_with_tracks("Zeta", &uris(&["a", "b"])).await.unwrap();
        let second = repo.insert("Alpha").await.unwrap();

        let list = repo.list_with_counts().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, first);
        assert_eq!(list[0].number_of_music, 2);
        assert_eq!(list[1].id, second);
        assert_eq!(list[1].number_of_music, 0);
    }

    #[tokio::test]
    async fn test_writes_notify_tracker() {
        let (repo, tracker) = setup().await;
        let mut rx = tracker.subscribe();

        let id = repo.insert("Mix").await.unwrap();
        assert!(rx.recv().await.unwrap().contains(Table::Playlists));

        repo.add_tracks(id, &uris(&["a"])).await.unwrap();
        assert!(rx.recv().await.unwrap().contains(Table::PlaylistTracks));

        // Nothing new linked, nothing reported
        repo.add_tracks(id, &uris(&["a"])).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
