//! # Metadata & Lyrics Module
//!
//! Reads audio files into library tracks and looks up lyrics for them.
//!
//! ## Overview
//!
//! This module handles:
//! - Audio tag extraction (ID3, Vorbis, MP4, FLAC, WAV)
//! - Directory scans producing the catalog for library sync
//! - Lyrics lookup: embedded tags, then the cache, then network providers
//!   (network providers are feature-gated behind `lyrics`)
//! - Synced LRC parsing

pub mod error;
pub mod extractor;
pub mod lrc;
pub mod lyrics;
pub mod scanner;

pub use error::{MetadataError, Result};
pub use extractor::{ExtractedTags, MetadataExtractor};
pub use lyrics::{LyricsOutcome, LyricsService};
pub use scanner::{LibraryScanner, ScanReport};
