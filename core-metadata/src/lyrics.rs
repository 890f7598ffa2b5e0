//! # Lyrics Lookup
//!
//! Finds lyrics for a library track, with support for both synced (LRC
//! format) and plain text lyrics.
//!
//! ## Lookup order
//!
//! 1. Lyrics embedded in the audio file's tags
//! 2. The lyrics cache (`LyricsRepository`)
//! 3. Network providers, in order, each retried with exponential backoff
//!
//! Network hits are written to the cache. The result distinguishes "nobody
//! has lyrics for this track" from "a provider could not be reached", so the
//! host can offer a retry only for the latter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_metadata::lyrics::{LyricsOutcome, LyricsService, TagLyricsReader};
//!
//! let service = LyricsService::new(lyrics_repo)
//!     .with_embedded_reader(Arc::new(TagLyricsReader::new()))
//!     .with_provider(Box::new(LrcLibProvider::new("https://lrclib.net/api")?));
//!
//! match service.lookup(&track).await? {
//!     LyricsOutcome::Found(lyrics) => show(lyrics),
//!     LyricsOutcome::NotFound => show_placeholder(),
//!     LyricsOutcome::NetworkError(reason) => offer_retry(reason),
//! }
//! ```

use crate::error::Result;
use crate::extractor::{path_from_uri, MetadataExtractor};
use crate::lrc;
use async_trait::async_trait;
use core_library::models::{Lyrics, Track};
use core_library::repositories::LyricsRepository;
use core_runtime::config::LyricsConfig;
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Core Types
// =============================================================================

/// Lyrics search query parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsSearchQuery {
    /// Artist name
    pub artist: String,
    /// Track title
    pub track: String,
    /// Album name (optional, helps improve matching)
    pub album: Option<String>,
    /// Track duration in seconds (optional, helps improve matching)
    pub duration: Option<u32>,
}

impl LyricsSearchQuery {
    /// Query describing a library track
    pub fn from_track(track: &Track) -> Self {
        Self {
            artist: track.artist.clone(),
            track: track.title.clone(),
            album: track.album.clone(),
            duration: (track.duration_ms > 0).then(|| track.duration_secs()),
        }
    }
}

/// Lyrics returned by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsResult {
    /// Lyrics text (plain or LRC format)
    pub text: String,
    /// Whether lyrics are synced (LRC format)
    pub is_synced: bool,
    /// Source of lyrics
    pub source: LyricsSource,
}

/// Where lyrics came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricsSource {
    /// LRCLib - Free, open-source synced lyrics
    LrcLib,
    /// Embedded in audio file
    Embedded,
    /// Manually added by user
    Manual,
}

impl LyricsSource {
    /// Get source name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LrcLib => "lrclib",
            Self::Embedded => "embedded",
            Self::Manual => "manual",
        }
    }
}

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsOutcome {
    Found(Lyrics),
    NotFound,
    /// Every provider that was asked failed to answer
    NetworkError(String),
}

impl LyricsOutcome {
    pub fn lyrics(&self) -> Option<&Lyrics> {
        match self {
            LyricsOutcome::Found(lyrics) => Some(lyrics),
            _ => None,
        }
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Trait for network lyrics providers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Fetch lyrics for a track
    ///
    /// # Returns
    /// * `Ok(Some(lyrics))` if lyrics found
    /// * `Ok(None)` if lyrics not found
    /// * `Err` if API error or network failure
    async fn fetch(&self, query: &LyricsSearchQuery) -> Result<Option<LyricsResult>>;

    /// Get the source identifier
    fn source(&self) -> LyricsSource;
}

/// Reads lyrics stored alongside the audio
#[async_trait]
pub trait EmbeddedLyricsReader: Send + Sync {
    async fn read(&self, track: &Track) -> Result<Option<String>>;
}

/// Reads lyrics from the audio file's tags. Only `file://` tracks are read.
pub struct TagLyricsReader {
    extractor: MetadataExtractor,
}

impl TagLyricsReader {
    pub fn new() -> Self {
        Self {
            extractor: MetadataExtractor::new(),
        }
    }
}

impl Default for TagLyricsReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddedLyricsReader for TagLyricsReader {
    async fn read(&self, track: &Track) -> Result<Option<String>> {
        let Some(path) = path_from_uri(&track.uri) else {
            return Ok(None);
        };
        let tags = self.extractor.extract_from_file(path).await?;
        Ok(tags.lyrics)
    }
}

// =============================================================================
// Lyrics Service
// =============================================================================

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per provider
    pub max_attempts: usize,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl From<&LyricsConfig> for RetryConfig {
    fn from(config: &LyricsConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for attempt number
    fn backoff_duration(&self, attempt: usize) -> Duration {
        let factor = 2u64.saturating_pow(attempt as u32);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(10_000)) // Cap at 10 seconds
    }
}

/// Coordinates the embedded reader, the cache and network providers
pub struct LyricsService {
    repository: Arc<dyn LyricsRepository>,
    embedded: Option<Arc<dyn EmbeddedLyricsReader>>,
    providers: Vec<Box<dyn LyricsProvider>>,
    retry_config: RetryConfig,
}

impl LyricsService {
    /// Cache-only service; add sources with the `with_*` builders
    pub fn new(repository: Arc<dyn LyricsRepository>) -> Self {
        Self {
            repository,
            embedded: None,
            providers: Vec::new(),
            retry_config: RetryConfig::default(),
        }
    }

    /// Service configured from runtime settings: tag reader always, LRCLib
    /// when network lookups are enabled.
    #[cfg(feature = "lyrics")]
    pub fn from_config(
        config: &LyricsConfig,
        repository: Arc<dyn LyricsRepository>,
    ) -> Result<Self> {
        let mut service = Self::new(repository)
            .with_embedded_reader(Arc::new(TagLyricsReader::new()))
            .with_retry_config(RetryConfig::from(config));

        if config.enabled {
            service = service.with_provider(Box::new(LrcLibProvider::new(&config.base_url)?));
        } else {
            debug!("Network lyrics lookups disabled");
        }
        Ok(service)
    }

    pub fn with_embedded_reader(mut self, reader: Arc<dyn EmbeddedLyricsReader>) -> Self {
        self.embedded = Some(reader);
        self
    }

    pub fn with_provider(mut self, provider: Box<dyn LyricsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Find lyrics for `track`.
    ///
    /// # Errors
    ///
    /// Lookup failures are folded into the outcome; an error is only
    /// returned when a network hit cannot be built into valid lyrics.
    #[instrument(skip(self, track), fields(file = %strip_path(&track.uri)))]
    pub async fn lookup(&self, track: &Track) -> Result<LyricsOutcome> {
        if let Some(lyrics) = self.read_embedded(track).await {
            return Ok(LyricsOutcome::Found(lyrics));
        }

        match self.repository.find_by_track_uri(&track.uri).await {
            Ok(Some(cached)) => {
                debug!(source = %cached.source, "Found cached lyrics");
                return Ok(LyricsOutcome::Found(cached));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Lyrics cache lookup failed"),
        }

        let query = LyricsSearchQuery::from_track(track);
        let mut network_failure = None;

        for provider in &self.providers {
            let source = provider.source().as_str();
            info!(source, artist = %query.artist, "Attempting to fetch lyrics");

            match self.fetch_with_retry(provider.as_ref(), &query).await {
                Ok(Some(result)) => {
                    info!(source, synced = result.is_synced, "Successfully fetched lyrics");

                    let lyrics = Lyrics::new(
                        track.uri.clone(),
                        result.source.as_str(),
                        result.is_synced,
                        result.text,
                    );
                    if let Err(e) = self.repository.upsert(&lyrics).await {
                        warn!(error = %e, "Failed to cache lyrics");
                    }
                    return Ok(LyricsOutcome::Found(lyrics));
                }
                Ok(None) => {
                    debug!(source, "Lyrics not found at provider");
                }
                Err(e) => {
                    warn!(source, error = %e, "Provider fetch failed");
                    network_failure = Some(e.to_string());
                }
            }
        }

        match network_failure {
            Some(reason) => Ok(LyricsOutcome::NetworkError(reason)),
            None => {
                debug!("No lyrics found");
                Ok(LyricsOutcome::NotFound)
            }
        }
    }

    /// Forget cached lyrics for a track
    pub async fn delete_cached(&self, track_uri: &str) -> Result<bool> {
        Ok(self.repository.delete(track_uri).await?)
    }

    /// Number of cached lyrics
    pub async fn cached_count(&self) -> Result<i64> {
        Ok(self.repository.count().await?)
    }

    async fn read_embedded(&self, track: &Track) -> Option<Lyrics> {
        let reader = self.embedded.as_ref()?;
        match reader.read(track).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                debug!("Found embedded lyrics");
                let synced = lrc::is_synced(&text);
                Some(Lyrics::new(
                    track.uri.clone(),
                    LyricsSource::Embedded.as_str(),
                    synced,
                    text,
                ))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Embedded lyrics unavailable");
                None
            }
        }
    }

    /// Fetch with retry logic
    async fn fetch_with_retry(
        &self,
        provider: &dyn LyricsProvider,
        query: &LyricsSearchQuery,
    ) -> Result<Option<LyricsResult>> {
        let max_attempts = self.retry_config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            match provider.fetch(query).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(e);
                    }

                    let delay = self.retry_config.backoff_duration(attempts);
                    debug!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// =============================================================================
// Provider Implementations
// =============================================================================

#[cfg(feature = "lyrics")]
pub use providers::LrcLibProvider;

#[cfg(feature = "lyrics")]
mod providers {
    use super::*;
    use crate::error::MetadataError;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// LRCLib provider - Free, open-source synced lyrics
    pub struct LrcLibProvider {
        client: reqwest::Client,
        base_url: String,
    }

    impl LrcLibProvider {
        pub fn new(base_url: impl Into<String>) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(concat!("player-core/", env!("CARGO_PKG_VERSION")))
                .build()?;

            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            })
        }
    }

    #[async_trait]
    impl LyricsProvider for LrcLibProvider {
        async fn fetch(&self, query: &LyricsSearchQuery) -> Result<Option<LyricsResult>> {
            let mut params = vec![
                ("artist_name", query.artist.clone()),
                ("track_name", query.track.clone()),
            ];
            if let Some(album) = &query.album {
                params.push(("album_name", album.clone()));
            }
            if let Some(duration) = query.duration {
                params.push(("duration", duration.to_string()));
            }

            let response = self
                .client
                .get(format!("{}/get", self.base_url))
                .query(&params)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(MetadataError::LyricsFetchFailed(format!(
                    "LRCLib API error: HTTP {}",
                    status.as_u16()
                )));
            }

            let body: LrcLibResponse = response.json().await?;
            Ok(body.into_result())
        }

        fn source(&self) -> LyricsSource {
            LyricsSource::LrcLib
        }
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct LrcLibResponse {
        #[serde(rename = "syncedLyrics")]
        pub(super) synced_lyrics: Option<String>,
        #[serde(rename = "plainLyrics")]
        pub(super) plain_lyrics: Option<String>,
    }

    impl LrcLibResponse {
        /// Prefer synced lyrics, fall back to plain ones
        pub(super) fn into_result(self) -> Option<LyricsResult> {
            let pick = |text: Option<String>, is_synced: bool| {
                text.filter(|t| !t.trim().is_empty())
                    .map(|text| LyricsResult {
                        text,
                        is_synced,
                        source: LyricsSource::LrcLib,
                    })
            };

            pick(self.synced_lyrics, true).or_else(|| pick(self.plain_lyrics, false))
        }
    }
}
