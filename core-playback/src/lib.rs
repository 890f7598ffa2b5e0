//! # Playback Queue Module
//!
//! Provides the in-memory playback queue the player works through.
//!
//! ## Overview
//!
//! This module handles:
//! - Ordered queue items with a bounds-checked cursor
//! - Insert-next, append, remove and reorder operations
//! - Shuffle with restorable original order
//!
//! Audio decoding and output are out of scope; the host player reads the
//! current track from the queue and drives its own audio pipeline.

pub mod queue;

pub use queue::{MusicQueue, QueueItem};
