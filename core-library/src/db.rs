//! # Database
//!
//! Opens the SQLite database behind the catalog, playlists and lyrics cache,
//! applies the embedded migrations and checks that every table the
//! repositories query is present.
//!
//! File databases run in WAL mode so live-view refreshes can read while a
//! playlist transaction writes. An in-memory database only exists inside the
//! connection that created it, so it is pinned to a single connection that
//! is never recycled.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::file("music.db")).await?;
//! let playlists = SqlitePlaylistRepository::new(pool.clone(), tracker.clone());
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime marker for an in-memory database.
pub const MEMORY_MARKER: &str = ":memory:";

/// Tables the repositories depend on.
const REQUIRED_TABLES: [&str; 4] = ["tracks", "playlists", "playlist_tracks", "lyrics"];

/// Readers allowed next to the single WAL writer.
const FILE_POOL_CONNECTIONS: u32 = 4;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    File(PathBuf),
    Memory,
}

/// How to open the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub storage: Storage,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Database stored in `path`, created if missing.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: Storage::File(path.into()),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            storage: Storage::Memory,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Configuration for a runtime `database_path` setting, honouring the
    /// `":memory:"` marker.
    pub fn from_path(path: &Path) -> Self {
        if path == Path::new(MEMORY_MARKER) {
            Self::in_memory()
        } else {
            Self::file(path)
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.storage == Storage::Memory
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout);

        match &self.storage {
            Storage::Memory => options.in_memory(true),
            Storage::File(path) => options
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        }
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        match self.storage {
            // Recycling the only connection would drop the database with it
            Storage::Memory => SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            Storage::File(_) => SqlitePoolOptions::new().max_connections(FILE_POOL_CONNECTIONS),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the database, run migrations and verify the schema.
///
/// # Errors
///
/// Returns [`LibraryError::Database`] if the database cannot be opened and
/// [`LibraryError::Migration`] if migrations fail or leave a table missing.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(storage = ?config.storage, "Opening database");

    let pool = config
        .pool_options()
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open database");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            LibraryError::Migration(e.to_string())
        })?;

    verify_schema(&pool).await?;

    debug!(connections = pool.size(), "Database ready");
    Ok(pool)
}

/// Migrated in-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    let present: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(pool)
            .await?;

    let missing: Vec<&str> = REQUIRED_TABLES
        .into_iter()
        .filter(|table| !present.iter().any(|name| name == table))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LibraryError::Migration(format!(
            "missing tables after migration: {}",
            missing.join(", ")
        )))
    }
}
