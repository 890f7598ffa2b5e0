//! # Library Scanner
//!
//! Walks a music directory and turns every supported audio file into a
//! library [`Track`]. The result is meant to be handed to
//! `SqliteLibrarySource::sync`, which replaces the catalog with it.
//!
//! Directory traversal runs on the blocking pool; tag reading is async.
//! Files that cannot be read are skipped with a warning and reported in
//! [`ScanReport::skipped`].

use crate::error::{MetadataError, Result};
use crate::extractor::MetadataExtractor;
use core_library::models::Track;
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Extensions picked up by default, lowercase without the dot.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "opus", "m4a", "aac", "wav", "aiff", "wv", "ape",
];

/// Outcome of a scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Tracks found, ordered by path
    pub tracks: Vec<Track>,
    /// Audio files whose tags could not be read
    pub skipped: Vec<PathBuf>,
}

/// Scans directories for audio files.
pub struct LibraryScanner {
    extractor: MetadataExtractor,
    extensions: Vec<String>,
    follow_links: bool,
    include_hidden: bool,
}

impl LibraryScanner {
    pub fn new() -> Self {
        Self {
            extractor: MetadataExtractor::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_links: false,
            include_hidden: false,
        }
    }

    /// Replace the accepted extensions (with or without a leading dot)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Scan `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::FileNotFound`] when `root` does not exist and
    /// a walk error when the root itself cannot be listed. Problems with
    /// individual entries are logged and skipped.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub async fn scan(&self, root: &Path) -> Result<ScanReport> {
        if !tokio::fs::try_exists(root).await? {
            return Err(MetadataError::FileNotFound(root.display().to_string()));
        }

        let paths = {
            let root = root.to_path_buf();
            let extensions = self.extensions.clone();
            let follow_links = self.follow_links;
            let include_hidden = self.include_hidden;
            tokio::task::spawn_blocking(move || {
                collect_audio_files(&root, &extensions, follow_links, include_hidden)
            })
            .await
            .map_err(|e| MetadataError::TaskFailed(e.to_string()))??
        };

        debug!(files = paths.len(), "Collected audio files");

        let mut report = ScanReport::default();
        for path in paths {
            match self.extractor.extract_from_file(&path).await {
                Ok(tags) => report.tracks.push(MetadataExtractor::to_track(&path, &tags)),
                Err(e) => {
                    let shown = path.to_string_lossy();
                    warn!(file = %strip_path(&shown), error = %e, "Skipping unreadable file");
                    report.skipped.push(path);
                }
            }
        }

        info!(
            tracks = report.tracks.len(),
            skipped = report.skipped.len(),
            "Library scan finished"
        );
        Ok(report)
    }
}

impl Default for LibraryScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_audio_files(
    root: &Path,
    extensions: &[String],
    follow_links: bool,
    include_hidden: bool,
) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_has_extension_is_case_insensitive() {
        let exts = vec!["mp3".to_string(), "flac".to_string()];
        assert!(has_extension(Path::new("/m/a.MP3"), &exts));
        assert!(has_extension(Path::new("/m/b.flac"), &exts));
        assert!(!has_extension(Path::new("/m/cover.jpg"), &exts));
        assert!(!has_extension(Path::new("/m/noext"), &exts));
    }

    #[test]
    fn test_with_extensions_normalizes() {
        let scanner = LibraryScanner::new().with_extensions([".MP3", " flac ", ""]);
        assert_eq!(scanner.extensions, vec!["mp3", "flac"]);
    }

    #[test]
    fn test_collect_skips_hidden_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("album")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        fs::write(root.join("album/02.mp3"), b"x").unwrap();
        fs::write(root.join("album/01.mp3"), b"x").unwrap();
        fs::write(root.join("album/cover.jpg"), b"x").unwrap();
        fs::write(root.join(".trash/old.mp3"), b"x").unwrap();
        fs::write(root.join(".hidden.mp3"), b"x").unwrap();

        let exts = vec!["mp3".to_string()];
        let found = collect_audio_files(root, &exts, false, false).unwrap();
        assert_eq!(
            found,
            vec![root.join("album/01.mp3"), root.join("album/02.mp3")]
        );

        let with_hidden = collect_audio_files(root, &exts, false, true).unwrap();
        assert_eq!(with_hidden.len(), 4);
    }

    #[tokio::test]
    async fn test_scan_missing_root() {
        let result = LibraryScanner::new()
            .scan(Path::new("/definitely/not/a/music/dir"))
            .await;
        assert!(matches!(result, Err(MetadataError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_scan_skips_unreadable_audio() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.mp3"), b"not audio at all").unwrap();

        let report = LibraryScanner::new().scan(dir.path()).await.unwrap();
        assert!(report.tracks.is_empty());
        assert_eq!(report.skipped, vec![dir.path().join("broken.mp3")]);
    }
}
