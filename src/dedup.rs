use futures_util::future::Shared;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::debug;
use tracing::trace;

use crate::error::SyncError;
use crate::types::CacheKey;
use crate::types::Pending;

pub type SharedFetch<V> = Shared<Pending<V>>;

struct InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    // Distinguishes a fetch from its successor for the same key after `cancel_all()`.
    ticket: u64,
    fetch:  SharedFetch<V>,
    abort:  AbortHandle,
}

/// Collapses concurrent requests for the same key into a single fetch.
///
/// The fetch runs on its own task, so it completes even if every waiter goes away. The in-flight marker is removed
/// when the fetch settles, successfully or not; the next `resolve()` for the key starts over. Errors are handed to
/// every waiter as is, there are no retries here.
pub struct Deduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    in_flight:   Mutex<HashMap<CacheKey, InFlight<V>>>,
    next_ticket: AtomicU64,
}

impl<V> Deduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight:   Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        })
    }

    /// Join the fetch in flight for `key`, or start a new one with `fetcher`. The fetcher is called at most once per
    /// fetch and only while holding the in-flight map lock, so it must merely construct the future.
    ///
    /// Must be called within a tokio runtime.
    pub fn resolve<F, Fut>(self: &Arc<Self>, key: CacheKey, fetcher: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SyncError>> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();

        if let Some(pending) = in_flight.get(&key) {
            trace!("joining in-flight fetch of {key}");
            return pending.fetch.clone();
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let fetch = fetcher();
        let owner = Arc::downgrade(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = fetch.await;
            if let Some(owner) = owner.upgrade() {
                owner.settle(&task_key, ticket);
            }
            outcome
        });
        let abort = handle.abort_handle();

        let join_key = key.clone();
        let fetch = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() => Err(SyncError::Cancelled(join_key)),
                Err(err) => Err(SyncError::Task(err.to_string())),
            }
        }
        .boxed()
        .shared();

        debug!("fetching {key} (ticket {ticket})");
        in_flight.insert(
            key,
            InFlight {
                ticket,
                fetch: fetch.clone(),
                abort,
            },
        );
        fetch
    }

    pub fn in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }

    /// Abort every fetch in flight. Their waiters receive [`SyncError::Cancelled`]. Returns the number of aborted
    /// fetches.
    pub fn cancel_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.in_flight.lock());
        let count = drained.len();
        for (key, pending) in drained {
            trace!("cancelling fetch of {key} (ticket {})", pending.ticket);
            pending.abort.abort();
        }
        count
    }

    fn settle(&self, key: &CacheKey, ticket: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(key).is_some_and(|pending| pending.ticket == ticket) {
            in_flight.remove(key);
            trace!("fetch of {key} settled (ticket {ticket})");
        }
    }
}

impl<V> Debug for Deduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self.in_flight.lock();
        fmt.debug_struct("Deduplicator")
            .field("in_flight", &in_flight.keys().collect::<Vec<_>>())
            .finish()
    }
}
