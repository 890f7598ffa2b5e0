//! # Shared Live Queries
//!
//! A [`SharedQuery`] keeps the result of a database query up to date while
//! anyone is watching it, and shares one running query between all
//! watchers.
//!
//! ## Sharing policy
//!
//! - The first [`subscribe`](SharedQuery::subscribe) starts a background
//!   worker that runs the query and re-runs it whenever one of the observed
//!   tables is invalidated.
//! - Every subscriber holds a reference; dropping the [`LiveSubscription`]
//!   releases it.
//! - When the last subscriber leaves, the worker keeps running for the grace
//!   period. A new subscriber inside that window reuses it as-is; otherwise
//!   the worker is stopped and the cached value is cleared.
//! - Subscribing after teardown starts a fresh worker.
//!
//! Values are conflated: a refresh that produces an equal result does not
//! wake subscribers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let playlists = SharedQuery::new(
//!     "playlists_with_info",
//!     TableSet::of(Table::Playlists).with(Table::PlaylistTracks),
//!     tracker.clone(),
//!     Duration::from_secs(5),
//!     move || {
//!         let store = Arc::clone(&store);
//!         async move { store.list_with_counts().await }
//!     },
//! );
//!
//! let mut subscription = playlists.subscribe();
//! let current = subscription.first().await;
//! ```

use crate::error::Result;
use crate::invalidation::{InvalidationTracker, TableSet};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Values that can be published by a live query.
pub trait LiveValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> LiveValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

type QueryFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A query whose result is shared while subscribed, with a teardown grace
/// period.
pub struct SharedQuery<T: LiveValue> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: LiveValue> {
    name: String,
    tables: TableSet,
    tracker: InvalidationTracker,
    grace_period: Duration,
    fetch: QueryFn<T>,
    sender: watch::Sender<Option<T>>,
    state: Mutex<SharingState>,
}

#[derive(Default)]
struct SharingState {
    subscribers: usize,
    worker: Option<JoinHandle<()>>,
    teardown: Option<JoinHandle<()>>,
}

impl<T: LiveValue> SharedQuery<T> {
    /// Create a shared query.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in logs
    /// * `tables` - Tables whose invalidation triggers a refresh
    /// * `tracker` - Invalidation source shared with the repositories
    /// * `grace_period` - How long to keep running without subscribers
    /// * `fetch` - Produces a fresh result
    pub fn new<F, Fut>(
        name: impl Into<String>,
        tables: impl Into<TableSet>,
        tracker: InvalidationTracker,
        grace_period: Duration,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetch: QueryFn<T> = Arc::new(move || fetch().boxed());
        let (sender, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                tables: tables.into(),
                tracker,
                grace_period,
                fetch,
                sender,
                state: Mutex::new(SharingState::default()),
            }),
        }
    }

    /// Start observing the query.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> LiveSubscription<T> {
        let receiver = self.inner.sender.subscribe();

        {
            let mut state = self.inner.lock_state();
            state.subscribers += 1;

            if let Some(teardown) = state.teardown.take() {
                trace!(query = %self.inner.name, "Teardown cancelled by new subscriber");
                teardown.abort();
            }

            let running = state
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.is_finished());
            if !running {
                debug!(query = %self.inner.name, "Starting live query");
                state.worker = Some(tokio::spawn(run_worker(Arc::clone(&self.inner))));
            }
        }

        LiveSubscription {
            receiver,
            _guard: SubscriberGuard {
                inner: Arc::clone(&self.inner),
            },
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers
    }

    /// Whether the backing query is currently running.
    pub fn is_active(&self) -> bool {
        self.inner
            .lock_state()
            .worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Last published value, if the query is active and has produced one.
    pub fn current(&self) -> Option<T> {
        self.inner.sender.borrow().clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<T: LiveValue> Clone for SharedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: LiveValue> fmt::Debug for SharedQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQuery")
            .field("name", &self.inner.name)
            .field("tables", &self.inner.tables)
            .field("subscribers", &self.subscriber_count())
            .field("active", &self.is_active())
            .finish()
    }
}

impl<T: LiveValue> Inner<T> {
    fn lock_state(&self) -> MutexGuard<'_, SharingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, state: &mut SharingState) {
        if let Some(worker) = state.worker.take() {
            debug!(query = %self.name, "Stopping live query");
            worker.abort();
        }
        state.teardown = None;
        self.sender.send_replace(None);
    }
}

async fn run_worker<T: LiveValue>(inner: Arc<Inner<T>>) {
    // Subscribe before the first fetch so writes racing with it are not lost
    let mut invalidations = inner.tracker.subscribe();

    loop {
        match (inner.fetch)().await {
            Ok(value) => {
                inner.sender.send_if_modified(|current| {
                    if current.as_ref() == Some(&value) {
                        false
                    } else {
                        *current = Some(value);
                        true
                    }
                });
            }
            Err(e) => {
                warn!(query = %inner.name, error = %e, "Live query refresh failed");
            }
        }

        if !wait_for_invalidation(&mut invalidations, inner.tables).await {
            debug!(query = %inner.name, "Invalidation source closed");
            return;
        }
    }
}

/// Wait until one of `tables` changes. Returns `false` once the tracker is
/// gone.
async fn wait_for_invalidation(
    invalidations: &mut broadcast::Receiver<TableSet>,
    tables: TableSet,
) -> bool {
    loop {
        match invalidations.recv().await {
            Ok(changed) if changed.intersects(tables) => break,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                trace!(skipped, "Invalidations lagged, refreshing");
                break;
            }
            Err(RecvError::Closed) => return false,
        }
    }

    // One refresh covers a burst of writes
    loop {
        match invalidations.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => return false,
        }
    }
}

struct SubscriberGuard<T: LiveValue> {
    inner: Arc<Inner<T>>,
}

impl<T: LiveValue> Drop for SubscriberGuard<T> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers > 0 {
            return;
        }

        if self.inner.grace_period.is_zero() {
            self.inner.stop(&mut state);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                trace!(
                    query = %self.inner.name,
                    grace_ms = self.inner.grace_period.as_millis() as u64,
                    "Last subscriber left, scheduling teardown"
                );
                let inner = Arc::clone(&self.inner);
                state.teardown = Some(handle.spawn(async move {
                    tokio::time::sleep(inner.grace_period).await;
                    let mut state = inner.lock_state();
                    if state.subscribers == 0 {
                        inner.stop(&mut state);
                    }
                }));
            }
            // Outside a runtime nothing can drive the timer
            Err(_) => self.inner.stop(&mut state),
        }
    }
}

/// A handle on a [`SharedQuery`] result. Dropping it unsubscribes.
pub struct LiveSubscription<T: LiveValue> {
    receiver: watch::Receiver<Option<T>>,
    _guard: SubscriberGuard<T>,
}

impl<T: LiveValue> LiveSubscription<T> {
    /// The most recent value, `None` until the first query completes.
    pub fn current(&self) -> Option<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the first available value.
    pub async fn first(&mut self) -> Option<T> {
        self.wait_until(|_| true).await
    }

    /// Wait until a published value satisfies `predicate`, checking the
    /// current value first.
    pub async fn wait_until<F>(&mut self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.receiver
            .wait_for(|value| value.as_ref().is_some_and(&mut predicate))
            .await
            .ok()
            .and_then(|value| (*value).clone())
    }

    /// Wait for the next value published after the last one seen.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }
}

impl<T: LiveValue> fmt::Debug for LiveSubscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("query", &self._guard.inner.name)
            .field("has_value", &self.receiver.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use crate::invalidation::Table;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    struct Fixture {
        tracker: InvalidationTracker,
        value: Arc<AtomicI64>,
        fetches: Arc<AtomicUsize>,
        query: SharedQuery<i64>,
    }

    fn fixture(grace: Duration) -> Fixture {
        let tracker = InvalidationTracker::new();
        let value = Arc::new(AtomicI64::new(1));
        let fetches = Arc::new(AtomicUsize::new(0));

        let query = {
            let value = Arc::clone(&value);
            let fetches = Arc::clone(&fetches);
            SharedQuery::new("counter", Table::Playlists, tracker.clone(), grace, move || {
                let value = Arc::clone(&value);
                let fetches = Arc::clone(&fetches);
                async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(value.load(Ordering::SeqCst))
                }
            })
        };

        Fixture {
            tracker,
            value,
            fetches,
            query,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_subscriber_starts_query() {
        let f = fixture(Duration::from_secs(5));
        assert!(!f.query.is_active());

        let mut sub = f.query.subscribe();
        assert_eq!(sub.first().await, Some(1));
        assert!(f.query.is_active());
        assert_eq!(f.query.subscriber_count(), 1);
        assert_eq!(f.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_share_one_query() {
        let f = fixture(Duration::from_secs(5));
        let mut a = f.query.subscribe();
        let mut b = f.query.subscribe();

        assert_eq!(a.first().await, Some(1));
        assert_eq!(b.first().await, Some(1));
        assert_eq!(f.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(f.query.subscriber_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relevant_invalidation_refreshes() {
        let f = fixture(Duration::from_secs(5));
        let mut sub = f.query.subscribe();
        assert_eq!(sub.first().await, Some(1));

        f.value.store(2, Ordering::SeqCst);
        f.tracker.notify(Table::Playlists);

        assert_eq!(sub.wait_until(|v| *v == 2).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_invalidation_is_ignored() {
        let f = fixture(Duration::from_secs(5));
        let mut sub = f.query.subscribe();
        sub.first().await;

        f.value.store(5, Ordering::SeqCst);
        f.tracker.notify(Table::Lyrics);
        settle().await;

        assert_eq!(f.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(sub.current(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_results_are_conflated() {
        let f = fixture(Duration::from_secs(5));
        let mut sub = f.query.subscribe();
        sub.first().await;

        // Same value: refetched but subscribers are not woken
        f.tracker.notify(Table::Playlists);
        settle().await;
        assert_eq!(f.fetches.load(Ordering::SeqCst), 2);

        f.value.store(3, Ordering::SeqCst);
        f.tracker.notify(Table::Playlists);
        assert_eq!(sub.next().await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_after_grace_period() {
        let f = fixture(Duration::from_secs(5));
        let mut sub = f.query.subscribe();
        sub.first().await;
        drop(sub);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(f.query.is_active(), "query should survive within grace period");
        assert_eq!(f.query.current(), Some(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!f.query.is_active(), "query should stop after grace period");
        assert_eq!(f.query.current(), None);
        assert_eq!(f.query.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_within_grace_keeps_query() {
        let f = fixture(Duration::from_secs(5));
        let mut sub = f.query.subscribe();
        sub.first().await;
        drop(sub);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let mut again = f.query.subscribe();
        assert_eq!(again.current(), Some(1));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(f.query.is_active());
        assert_eq!(again.first().await, Some(1));
        assert_eq!(f.fetches.load(Ordering::SeqCst), 1, "no restart expected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_after_teardown_restarts() {
        let f = fixture(Duration::from_secs(5));
        let mut sub = f.query.subscribe();
        sub.first().await;
        drop(sub);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!f.query.is_active());

        f.value.store(9, Ordering::SeqCst);
        let mut again = f.query.subscribe();
        assert_eq!(again.first().await, Some(9));
        assert_eq!(f.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_grace_period_stops_immediately() {
        let f = fixture(Duration::ZERO);
        let mut sub = f.query.subscribe();
        sub.first().await;
        drop(sub);

        assert!(!f.query.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_last_value() {
        let tracker = InvalidationTracker::new();
        let fail = Arc::new(AtomicUsize::new(0));
        let query = {
            let fail = Arc::clone(&fail);
            SharedQuery::new(
                "flaky",
                Table::Tracks,
                tracker.clone(),
                Duration::from_secs(5),
                move || {
                    let fail = Arc::clone(&fail);
                    async move {
                        if fail.load(Ordering::SeqCst) > 0 {
                            Err(LibraryError::TaskFailed("boom".to_string()))
                        } else {
                            Ok(42_i64)
                        }
                    }
                },
            )
        };

        let mut sub = query.subscribe();
        assert_eq!(sub.first().await, Some(42));

        fail.store(1, Ordering::SeqCst);
        tracker.notify(Table::Tracks);
        settle().await;

        assert!(query.is_active());
        assert_eq!(sub.current(), Some(42));
    }
}
