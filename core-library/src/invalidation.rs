//! # Table Invalidation Tracking
//!
//! SQLite has no push-based change feed, so every repository write reports
//! the tables it touched to an [`InvalidationTracker`]. Live queries
//! subscribe to the tracker and re-run when one of the tables they read from
//! changes.
//!
//! The tracker is a cheap, cloneable handle around a broadcast channel. It is
//! constructed once by the host and injected into every repository and live
//! query that shares the same database.

use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// Tables whose writes are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Tracks,
    Playlists,
    PlaylistTracks,
    Lyrics,
}

impl Table {
    const fn bit(self) -> u8 {
        match self {
            Table::Tracks => 1,
            Table::Playlists => 1 << 1,
            Table::PlaylistTracks => 1 << 2,
            Table::Lyrics => 1 << 3,
        }
    }
}

/// A small set of [`Table`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TableSet(u8);

impl TableSet {
    pub const EMPTY: TableSet = TableSet(0);

    pub const fn of(table: Table) -> Self {
        TableSet(table.bit())
    }

    pub const fn with(self, table: Table) -> Self {
        TableSet(self.0 | table.bit())
    }

    pub const fn contains(self, table: Table) -> bool {
        self.0 & table.bit() != 0
    }

    pub const fn intersects(self, other: TableSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: TableSet) -> Self {
        TableSet(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<Table> for TableSet {
    fn from(table: Table) -> Self {
        TableSet::of(table)
    }
}

impl fmt::Debug for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = [
            Table::Tracks,
            Table::Playlists,
            Table::PlaylistTracks,
            Table::Lyrics,
        ];
        f.debug_set()
            .entries(tables.iter().filter(|t| self.contains(**t)))
            .finish()
    }
}

/// Broadcasts which tables changed after a successful write.
#[derive(Clone)]
pub struct InvalidationTracker {
    sender: broadcast::Sender<TableSet>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Report that `tables` changed. Nobody listening is fine.
    pub fn notify(&self, tables: impl Into<TableSet>) {
        let tables = tables.into();
        if tables.is_empty() {
            return;
        }
        trace!(?tables, "Tables invalidated");
        let _ = self.sender.send(tables);
    }

    /// Receive every future invalidation.
    pub fn subscribe(&self) -> broadcast::Receiver<TableSet> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InvalidationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InvalidationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationTracker")
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_set_operations() {
        let membership = TableSet::of(Table::Playlists).with(Table::PlaylistTracks);
        assert!(membership.contains(Table::Playlists));
        assert!(membership.contains(Table::PlaylistTracks));
        assert!(!membership.contains(Table::Tracks));

        assert!(membership.intersects(TableSet::of(Table::PlaylistTracks)));
        assert!(!membership.intersects(TableSet::of(Table::Lyrics)));

        let all = membership.union(Table::Tracks.into());
        assert!(all.contains(Table::Tracks));
        assert!(TableSet::EMPTY.is_empty());
    }

    #[test]
    fn test_debug_lists_tables() {
        let set = TableSet::of(Table::Tracks).with(Table::Lyrics);
        let rendered = format!("{:?}", set);
        assert!(rendered.contains("Tracks"));
        assert!(rendered.contains("Lyrics"));
        assert!(!rendered.contains("Playlists"));
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let tracker = InvalidationTracker::new();
        let mut rx = tracker.subscribe();

        tracker.notify(Table::Playlists);
        assert_eq!(rx.recv().await.unwrap(), TableSet::of(Table::Playlists));
    }

    #[tokio::test]
    async fn test_empty_notification_is_dropped() {
        let tracker = InvalidationTracker::new();
        let mut rx = tracker.subscribe();

        tracker.notify(TableSet::EMPTY);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notify_without_observers() {
        let tracker = InvalidationTracker::new();
        assert_eq!(tracker.observer_count(), 0);
        tracker.notify(Table::Tracks);
    }
}
