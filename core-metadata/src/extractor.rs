//! # Audio Tag Extraction
//!
//! Reads the tags a library track needs from an audio file using the `lofty`
//! crate. ID3v2, Vorbis Comments, MP4 ilst, APE and RIFF INFO tags are
//! supported, whichever is primary for the file type.
//!
//! Files without tags still yield their duration; callers decide on
//! fallbacks for the missing text fields.

use crate::error::{MetadataError, Result};
use core_library::models::Track;
use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Title used when a file has neither a title tag nor a usable file name.
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// Artist used when a file has no artist tag.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Tags read from a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Embedded lyrics (USLT, LYRICS, ©lyr)
    pub lyrics: Option<String>,
    pub duration_ms: u64,
    /// Whether any tag block was present
    pub has_tags: bool,
}

/// Extracts tags from audio files.
pub struct MetadataExtractor {
    parse_options: ParseOptions,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    /// Create extractor with custom parse options
    pub fn with_options(parse_options: ParseOptions) -> Self {
        Self { parse_options }
    }

    /// Read tags and duration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a recognizable
    /// audio file.
    pub async fn extract_from_file(&self, path: &Path) -> Result<ExtractedTags> {
        debug!(file = %path.display(), "Extracting tags");

        let file_data = fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MetadataError::FileNotFound(path.display().to_string())
            } else {
                MetadataError::ExtractionFailed(format!("Failed to read file: {}", e))
            }
        })?;

        let tagged_file = Probe::new(std::io::Cursor::new(&file_data))
            .options(self.parse_options)
            .guess_file_type()?
            .read()?;

        let duration_ms = tagged_file.properties().duration().as_millis() as u64;

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag());

        let Some(tag) = tag else {
            return Ok(ExtractedTags {
                duration_ms,
                ..Default::default()
            });
        };

        Ok(ExtractedTags {
            title: tag.title().and_then(|s| non_empty(normalize_text(&s))),
            artist: tag.artist().and_then(|s| non_empty(normalize_text(&s))),
            album: tag.album().and_then(|s| non_empty(normalize_text(&s))),
            lyrics: tag
                .get_string(&ItemKey::Lyrics)
                .map(|s| s.trim().to_string())
                .and_then(non_empty),
            duration_ms,
            has_tags: true,
        })
    }

    /// Build a library track for `path` from extracted tags.
    ///
    /// Missing titles fall back to the file stem, missing artists to
    /// [`UNKNOWN_ARTIST`].
    pub fn to_track(path: &Path, tags: &ExtractedTags) -> Track {
        let title = tags.title.clone().unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(normalize_text)
                .and_then(non_empty)
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
        });
        let artist = tags
            .artist
            .clone()
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

        let mut track = Track::new(
            track_id(path),
            file_uri(path),
            title,
            artist,
            tags.duration_ms as i64,
        );
        track.album = tags.album.clone();
        track
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable track id: SHA-256 of the file path.
pub fn track_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `file://` URI for a local path.
pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Local path behind a `file://` URI, `None` for anything else.
pub fn path_from_uri(uri: &str) -> Option<&Path> {
    uri.strip_prefix("file://").map(Path::new)
}

/// Normalize text metadata
///
/// - Trims leading/trailing whitespace
/// - Normalizes consecutive whitespace to single space
/// - Removes null bytes and control characters
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
