use futures_util::future;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::cache::Slot;
use crate::prelude::*;

impl<B> SyncContext<B>
where
    B: CatalogBackend,
{
    /// Apply `value` optimistically and confirm it with `submit`.
    ///
    /// The cache is updated before this method returns, so the UI reflects the change immediately. `submit` then
    /// runs on its own task; dropping the returned future neither cancels it nor leaves the entry locked. On success
    /// the value returned by `submit` replaces the optimistic one. On failure the previous value is restored and the
    /// future resolves to [`SyncError::MutationFailed`].
    ///
    /// Only one mutation per entry may be pending, and status and score of an item count as one entry here since
    /// both are written with the same record. A second one is rejected with [`SyncError::MutationConflict`] without
    /// calling `submit` and without touching the first one.
    ///
    /// A submission that panics is rolled back like a failed one.
    ///
    /// Must be called within a tokio runtime.
    pub fn mutate<F, Fut>(&self, item: &ItemKey, value: Value, submit: F) -> Pending<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let key = CacheKey::new(value.kind(), item.clone());
        let Some(myself) = self.myself()
        else {
            return future::ready(Err(SyncError::Cancelled(key))).boxed();
        };

        let (session, slot, snapshot) = {
            let _reset = self.reset_guard();
            let session = self.session();
            let slot = self.slot(&key);
            // Status and score are halves of one server record: a pending write of either blocks the other.
            let sibling = key.record_sibling().map(|sibling| self.slot(&sibling));

            let snapshot = {
                // Always status before score.
                let (mut entry, sibling_entry) = match &sibling {
                    Some(other) if key.kind() == EntityKind::Score => {
                        let other = other.lock();
                        (slot.lock(), Some(other))
                    }
                    Some(other) => {
                        let entry = slot.lock();
                        (entry, Some(other.lock()))
                    }
                    None => (slot.lock(), None),
                };

                if entry.has_pending_mutation()
                    || sibling_entry.as_ref().is_some_and(|other| other.has_pending_mutation())
                {
                    debug!("[{}] rejecting mutation of {key}: another one is pending", self.name());
                    return future::ready(Err(SyncError::MutationConflict(key))).boxed();
                }
                entry.begin_mutation(value, Instant::now());
                entry.clone()
            };
            (session, slot, snapshot)
        };
        debug!("[{}] MUTATE({key}) = {value}", self.name());
        self.fanout().notify(&snapshot);

        let submission = AssertUnwindSafe(submit()).catch_unwind();
        let task_key = key.clone();
        let task_slot = slot.clone();
        let settler = myself.clone();
        let handle = tokio::spawn(async move {
            let outcome = match submission.await {
                Ok(outcome) => outcome,
                Err(_) => Err(ApiError::Aborted(format!("submission of {task_key} panicked"))),
            };
            settler.settle_mutation(&task_slot, task_key, session, outcome)
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                // The task never reached settlement; release the entry here.
                Err(err) => myself.settle_mutation(&slot, key, session, Err(ApiError::Aborted(err.to_string()))),
            }
        }
        .boxed()
    }

    fn settle_mutation(
        &self,
        slot: &Arc<Slot>,
        key: CacheKey,
        session: u64,
        outcome: Result<Value, ApiError>,
    ) -> Result<Value, SyncError> {
        let (snapshot, result) = {
            let mut entry = slot.lock();

            if self.session() != session {
                // The cache was reset meanwhile; the server outcome is still reported, the cache stays untouched.
                debug!("[{}] mutation of {key} settled after a reset", self.name());
                return outcome.map_err(|source| SyncError::MutationFailed { key, source });
            }

            match outcome {
                Ok(confirmed) => {
                    let confirmed = if confirmed.kind() == key.kind() {
                        confirmed
                    }
                    else {
                        warn!(
                            "[{}] backend confirmed {key} with a foreign value {confirmed}, keeping the optimistic one",
                            self.name()
                        );
                        entry.value().unwrap_or(confirmed)
                    };
                    entry.confirm_mutation(confirmed, Instant::now());
                    (entry.clone(), Ok(confirmed))
                }
                Err(source) => {
                    warn!("[{}] mutation of {key} failed, rolling back: {source}", self.name());
                    entry.rollback_mutation();
                    (entry.clone(), Err(SyncError::MutationFailed { key, source }))
                }
            }
        };
        self.fanout().notify(&snapshot);
        result
    }
}
