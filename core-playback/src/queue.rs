//! # Playback Queue
//!
//! [`MusicQueue`] is the ordered list of tracks the player works through,
//! plus a cursor pointing at the current item.
//!
//! ## Invariants
//!
//! - When the queue is non-empty, `0 <= current_index < len`
//! - When the queue is empty, `current_index == 0` and there is no current item
//! - Original positions form a permutation of `0..len`, so [`MusicQueue::unshuffle`]
//!   can always restore the pre-shuffle order
//!
//! Every mutator is infallible. Out-of-range input leaves the queue untouched
//! and is reported by returning `false`.

use core_library::models::Track;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A track in the queue together with its position in the unshuffled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique within the queue; survives reordering
    pub key: u64,
    pub track: Track,
    /// Position in the original, unshuffled order
    pub original_index: usize,
}

/// Ordered playback queue with a cursor.
///
/// Deserialized queues are repaired before use: the cursor is clamped, keys
/// are made unique and original positions are re-ranked into `0..len`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SavedQueue")]
pub struct MusicQueue {
    items: Vec<QueueItem>,
    current_index: usize,
    shuffled: bool,
    next_key: u64,
}

/// Wire shape of [`MusicQueue`], trusted only after [`From`] repairs it.
#[derive(Deserialize)]
struct SavedQueue {
    items: Vec<QueueItem>,
    current_index: usize,
    shuffled: bool,
    next_key: u64,
}

impl From<SavedQueue> for MusicQueue {
    fn from(saved: SavedQueue) -> Self {
        let SavedQueue {
            mut items,
            current_index,
            shuffled,
            next_key,
        } = saved;

        let mut keys: Vec<u64> = items.iter().map(|item| item.key).collect();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() != items.len() {
            for (i, item) in items.iter_mut().enumerate() {
                item.key = i as u64;
            }
        }

        let mut ranked: Vec<usize> = (0..items.len()).collect();
        ranked.sort_by_key(|&i| items[i].original_index);
        for (rank, i) in ranked.into_iter().enumerate() {
            items[i].original_index = rank;
        }

        let next_key = items
            .iter()
            .map(|item| item.key.saturating_add(1))
            .max()
            .unwrap_or(0)
            .max(next_key);

        Self {
            current_index: current_index.min(items.len().saturating_sub(1)),
            shuffled: shuffled && !items.is_empty(),
            items,
            next_key,
        }
    }
}

impl MusicQueue {
    /// The empty queue.
    pub const EMPTY: MusicQueue = MusicQueue {
        items: Vec::new(),
        current_index: 0,
        shuffled: false,
        next_key: 0,
    };

    /// Build a queue from `tracks`, starting at `start_index`.
    ///
    /// The start index is clamped to the last track.
    pub fn from_tracks(tracks: Vec<Track>, start_index: usize) -> Self {
        let items: Vec<QueueItem> = tracks
            .into_iter()
            .enumerate()
            .map(|(i, track)| QueueItem {
                key: i as u64,
                track,
                original_index: i,
            })
            .collect();

        let current_index = start_index.min(items.len().saturating_sub(1));
        let next_key = items.len() as u64;

        Self {
            items,
            current_index,
            shuffled: false,
            next_key,
        }
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_item(&self) -> Option<&QueueItem> {
        self.items.get(self.current_index)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_item().map(|item| &item.track)
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn has_next(&self) -> bool {
        !self.items.is_empty() && self.current_index < self.items.len() - 1
    }

    pub fn has_previous(&self) -> bool {
        self.current_index > 0
    }

    /// Advance the cursor. No wraparound.
    pub fn skip_to_next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.current_index += 1;
        true
    }

    /// Move the cursor back. No wraparound.
    pub fn skip_to_previous(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.current_index -= 1;
        true
    }

    /// Jump the cursor to `index`.
    pub fn skip_to(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.current_index = index;
        true
    }

    /// Insert `track` right after the current item, or at the front of an
    /// empty queue. The cursor does not move.
    pub fn insert_next(&mut self, track: Track) {
        let position = if self.items.is_empty() {
            0
        } else {
            self.current_index + 1
        };

        let original_index = match self.current_item() {
            Some(current) if self.shuffled => current.original_index + 1,
            _ => position,
        };
        self.insert_at(position, original_index, track);
    }

    /// Append `track` to the end of the queue.
    pub fn add_to_end(&mut self, track: Track) {
        let position = self.items.len();
        self.insert_at(position, position, track);
    }

    /// Remove the item at `index`.
    ///
    /// Removing an item before the cursor shifts the cursor back so it keeps
    /// pointing at the same item. Removing the current item makes the
    /// following item current, or the new last item if there is none.
    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }

        let removed = self.items.remove(index);
        for item in &mut self.items {
            if item.original_index > removed.original_index {
                item.original_index -= 1;
            }
        }

        if index < self.current_index {
            self.current_index -= 1;
        }

        if self.items.is_empty() {
            self.current_index = 0;
            self.shuffled = false;
        } else if self.current_index >= self.items.len() {
            self.current_index = self.items.len() - 1;
        }
        true
    }

    /// Move the item at `from` to `to`. The cursor follows the current item.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        let len = self.items.len();
        if from >= len || to >= len {
            return false;
        }
        if from == to {
            return true;
        }

        let item = self.items.remove(from);
        self.items.insert(to, item);

        let current = self.current_index;
        self.current_index = if from == current {
            to
        } else if from < current && to >= current {
            current - 1
        } else if from > current && to <= current {
            current + 1
        } else {
            current
        };

        if !self.shuffled {
            self.renumber();
        }
        true
    }

    /// Shuffle the queue with the thread-local RNG.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    /// Shuffle the queue with `rng`.
    ///
    /// The current item moves to the front and becomes the cursor; the rest
    /// are randomized. Original positions are kept for [`unshuffle`](Self::unshuffle).
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.items.is_empty() {
            return;
        }

        let current = self.items.remove(self.current_index);
        self.items.shuffle(rng);
        self.items.insert(0, current);
        self.current_index = 0;
        self.shuffled = true;
    }

    /// Restore the original order. The cursor follows the current item.
    pub fn unshuffle(&mut self) {
        if !self.shuffled {
            return;
        }

        let current_key = self.current_item().map(|item| item.key);
        self.items.sort_by_key(|item| item.original_index);
        self.current_index = current_key
            .and_then(|key| self.items.iter().position(|item| item.key == key))
            .unwrap_or(0);
        self.shuffled = false;
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = 0;
        self.shuffled = false;
    }

    fn insert_at(&mut self, position: usize, original_index: usize, track: Track) {
        for item in &mut self.items {
            if item.original_index >= original_index {
                item.original_index += 1;
            }
        }

        let key = self.next_key;
        self.next_key += 1;
        self.items.insert(
            position,
            QueueItem {
                key,
                track,
                original_index,
            },
        );

        // Keep pointing at the same item when inserting before it
        if self.items.len() > 1 && position <= self.current_index {
            self.current_index += 1;
        }
    }

    fn renumber(&mut self) {
        for (i, item) in self.items.iter_mut().enumerate() {
            item.original_index = i;
        }
    }
}
