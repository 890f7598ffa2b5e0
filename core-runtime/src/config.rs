//! # Core Configuration Module
//!
//! Provides configuration management for the music player core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every setting the core needs at startup. The builder
//! enforces fail-fast validation so that a misconfigured host finds out when
//! it boots rather than on the first playlist write.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite file that stores the library catalog, playlists
//!   and the lyrics cache (`":memory:"` for an ephemeral store)
//!
//! ## Optional Settings (with defaults)
//!
//! - `sharing_grace_period` - how long live views keep their query running
//!   after the last subscriber leaves (default 5 seconds)
//! - `event_buffer_size` - per-subscriber event buffer (default 100)
//! - `lyrics` - lyrics lookup settings (disabled by default)
//! - `logging` - subscriber installed at bootstrap (none by default, for hosts
//!   that set up `tracing` themselves)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, LyricsConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/music.db")
//!     .sharing_grace_period(Duration::from_secs(5))
//!     .lyrics(LyricsConfig::default().enabled(true))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // This will panic with an actionable error message
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing database path");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default grace period before an unobserved live view is torn down.
pub const DEFAULT_SHARING_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default per-subscriber buffer of the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Default LRCLib API endpoint.
pub const DEFAULT_LYRICS_BASE_URL: &str = "https://lrclib.net/api";

/// Path value that selects an in-memory database.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Core configuration for the music player core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Time a live view stays active after its last subscriber detaches
    pub sharing_grace_period: Duration,

    /// Event bus buffer size
    pub event_buffer_size: usize,

    /// Lyrics lookup settings
    pub lyrics: LyricsConfig,

    /// Logging installed by the service at bootstrap
    pub logging: Option<LoggingConfig>,
}

/// Lyrics lookup configuration.
///
/// Lyrics are resolved from the embedded tag first, then from the local
/// cache, and only then from the network. `enabled` only gates the network
/// tier; embedded and cached lyrics are always served.
///
/// # Example
///
/// ```
/// use core_runtime::config::LyricsConfig;
///
/// let config = LyricsConfig::default()
///     .enabled(true)
///     .max_attempts(2);
/// assert!(config.enabled);
/// assert_eq!(config.max_attempts, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsConfig {
    /// Enable network lookups
    pub enabled: bool,

    /// Base URL of the LRCLib-compatible API
    pub base_url: String,

    /// Maximum attempts per provider before giving up
    pub max_attempts: usize,

    /// Base delay for exponential backoff between attempts
    pub base_delay_ms: u64,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: DEFAULT_LYRICS_BASE_URL.to_string(),
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl LyricsConfig {
    /// Enable or disable network lookups
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the provider base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the maximum attempts per provider
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff base delay in milliseconds
    pub fn base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_delay_ms = delay_ms;
        self
    }

    /// Validates the lyrics settings
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Lyrics max_attempts must be at least 1".to_string(),
            ));
        }

        if self.enabled {
            if self.base_url.trim().is_empty() {
                return Err(Error::Config(
                    "Lyrics are enabled but no base URL is configured. \
                     Use LyricsConfig::base_url() or disable lyrics."
                        .to_string(),
                ));
            }

            if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "Lyrics base URL must be an http(s) URL, got: {}",
                    self.base_url
                )));
            }
        }

        if self.base_delay_ms > 10_000 {
            return Err(Error::Config(
                "Lyrics backoff delay exceeds maximum of 10 seconds (10,000ms)".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Configuration backed by an in-memory database, mostly for tests.
    pub fn in_memory() -> Self {
        Self {
            database_path: PathBuf::from(IN_MEMORY_DATABASE),
            sharing_grace_period: DEFAULT_SHARING_GRACE_PERIOD,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            lyrics: LyricsConfig::default(),
            logging: None,
        }
    }

    /// Whether the database lives only in memory.
    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY_DATABASE)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Grace period is at most one minute
    /// - Event buffer is non-zero
    /// - Lyrics settings are consistent
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.sharing_grace_period > Duration::from_secs(60) {
            return Err(Error::Config(
                "Sharing grace period exceeds maximum of 60 seconds".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if let Some(logging) = &self.logging {
            logging.validate()?;
        }

        self.lyrics.validate()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    sharing_grace_period: Option<Duration>,
    event_buffer_size: Option<usize>,
    lyrics: Option<LyricsConfig>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the database file path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the grace period for live views.
    pub fn sharing_grace_period(mut self, period: Duration) -> Self {
        self.sharing_grace_period = Some(period);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the lyrics configuration.
    pub fn lyrics(mut self, lyrics: LyricsConfig) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    /// Installs a `tracing` subscriber when the service boots.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the database path is missing or any
    /// setting fails validation.
    ///
    /// # Example
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let config = CoreConfig::builder()
    ///     .database_path("music.db")
    ///     .build()?;
    /// assert_eq!(config.event_buffer_size, 100);
    /// # Ok::<(), core_runtime::Error>(())
    /// ```
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            sharing_grace_period: self
                .sharing_grace_period
                .unwrap_or(DEFAULT_SHARING_GRACE_PERIOD),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            lyrics: self.lyrics.unwrap_or_default(),
            logging: self.logging,
        };

        config.validate()?;

        Ok(config)
    }
}
