use crate::dedup::Deduplicator;
use crate::fanout::Fanout;
use crate::prelude::*;
use crate::subscription::Subscription;
use fieldx_plus::child_build;
use fieldx_plus::fx_plus;
use futures_util::future;
use futures_util::FutureExt;
use moka::sync::Cache;
use parking_lot::Mutex;
use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;
use tracing::trace;
use tracing::warn;

pub(crate) type Slot = Mutex<CacheEntry>;

/// The process-wide home of watch status, score and favourite state.
///
/// A context is an explicit object with a lifecycle: build it once per signed-in session (or once per app and call
/// [`clear_all()`](Self::clear_all) on sign-out) and hand it to whatever renders catalog items.
///
/// ```ignore
/// let backend = HttpBackend::new(HttpConfig::builder().base_url("https://api.example.org").build()?)?;
/// let ctx = SyncContext::builder().backend(backend).build()?;
///
/// // Card mount.
/// let sub = ctx.subscribe(CacheKey::status("attack-on-titan"), |entry| redraw(entry))?;
/// let _ = ctx.fetch_status("attack-on-titan");
///
/// // Star tapped.
/// if let Err(err) = ctx.set_score("attack-on-titan", Score::from_stars(4.5)?).await {
///     alert(err);
/// }
///
/// // Card unmount.
/// drop(sub);
/// ```
///
/// Entries are created lazily and never evicted; the working set is bounded by the items visited in a session.
/// Every change of an entry is reported to the subscribers of that entry's key and nobody else.
#[fx_plus(
    parent,
    no_new,
    default(off),
    sync,
    builder(
        doc("Builder object of [`SyncContext`].", "", "See [`SyncContext::builder()`] method."),
        method_doc("Implement builder pattern for [`SyncContext`]."),
    )
)]
pub struct SyncContext<B>
where
    B: CatalogBackend,
{
    #[fieldx(vis(pub(crate)), builder(vis(pub), required, into), get(clone))]
    backend: Arc<B>,

    /// Context name. Most useful for debugging and logging.
    #[fieldx(get(clone), builder(into), default(String::from("watch-cache")))]
    name: String,

    /// How long a loaded entry is considered fresh by [`SyncContext::is_stale()`].
    #[fieldx(get(copy), default(Duration::from_secs(300)))]
    stale_after: Duration,

    #[fieldx(get(copy), default(64))]
    initial_capacity: usize,

    #[fieldx(vis(pub(crate)), lazy, clearer(private), get(clone), builder(off))]
    entries: Cache<CacheKey, Arc<Slot>>,

    // Last full record seen per item; a PUT must not clobber episodes, rewatches or the note.
    #[fieldx(vis(pub(crate)), lazy, clearer(private), get(clone), builder(off))]
    records: Cache<ItemKey, WatchRecord>,

    #[fieldx(vis(pub(crate)), lazy, get(clone), builder(off))]
    dedup: Arc<Deduplicator<Value>>,

    #[fieldx(vis(pub(crate)), lazy, get(clone), builder(off))]
    fanout: Arc<Fanout>,

    // Bumped by clear_all(). Work started under an older session must not touch the cache.
    #[fieldx(builder(off), default(AtomicU64::new(0)))]
    session: AtomicU64,

    // Shared while a session number is sampled along with a slot, exclusive while clear_all() swaps them.
    #[fieldx(builder(off), default(RwLock::new(())))]
    reset_lock: RwLock<()>,
}

impl<B> SyncContext<B>
where
    B: CatalogBackend,
{
    fn build_entries(&self) -> Cache<CacheKey, Arc<Slot>> {
        Cache::builder().initial_capacity(self.initial_capacity()).build()
    }

    fn build_records(&self) -> Cache<ItemKey, WatchRecord> {
        Cache::builder().initial_capacity(self.initial_capacity()).build()
    }

    fn build_dedup(&self) -> Arc<Deduplicator<Value>> {
        Deduplicator::new()
    }

    fn build_fanout(&self) -> Arc<Fanout> {
        Arc::new(Fanout::new())
    }

    pub(crate) fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    // While the guard is held the session number and the slot map stay in agreement.
    pub(crate) fn reset_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.reset_lock.read()
    }

    pub(crate) fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        self.entries()
            .get_with(key.clone(), || Arc::new(Mutex::new(CacheEntry::new(key.clone()))))
    }

    /// Synchronous read. Never triggers I/O and never creates an entry.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries().get(key).map(|slot| slot.lock().clone())
    }

    /// Unconditionally overwrite the entry for `value`'s kind of `item` and mark it ready. A pending optimistic
    /// mutation of the entry is left in place: its outcome will overwrite this value in turn.
    pub fn set(&self, item: &ItemKey, value: Value) {
        let key = CacheKey::new(value.kind(), item.clone());
        let snapshot = {
            let slot = self.slot(&key);
            let mut entry = slot.lock();
            entry.store(value, Instant::now());
            entry.clone()
        };
        trace!("[{}] SET({key}) = {value}", self.name());
        self.fanout().notify(&snapshot);
    }

    /// Mark the entry empty so the next [`ensure_loaded()`](Self::ensure_loaded) refetches it. The last value stays
    /// readable meanwhile. Entries that are loading already are left alone.
    pub fn invalidate(&self, key: &CacheKey) {
        let Some(slot) = self.entries().get(key)
        else {
            return;
        };
        let snapshot = {
            let mut entry = slot.lock();
            if !entry.invalidate() {
                return;
            }
            entry.clone()
        };
        trace!("[{}] INVALIDATE({key})", self.name());
        self.fanout().notify(&snapshot);
    }

    /// Re-publish the current state of an entry to its subscribers.
    pub fn notify(&self, key: &CacheKey) -> usize {
        let snapshot = self
            .get(key)
            .unwrap_or_else(|| CacheEntry::new(key.clone()));
        self.fanout().notify(&snapshot)
    }

    /// Make sure the entry is loaded.
    ///
    /// Loading starts right away, before the returned future is polled; dropping the future does not cancel it.
    /// A ready entry resolves immediately. An entry that is loading joins the fetch in flight. An empty or failed
    /// entry moves to `Loading` and a fetch is started through the deduplicator; score and status share a single
    /// request since they come from the same endpoint.
    ///
    /// The error, if any, is informational: the entry itself records the failure and the next call retries.
    pub fn ensure_loaded(&self, key: &CacheKey) -> Pending<()> {
        let Some(myself) = self.myself()
        else {
            return future::ready(Err(SyncError::Cancelled(key.clone()))).boxed();
        };

        let (fetch, transition) = {
            let _reset = self.reset_guard();
            let slot = self.slot(key);
            let mut entry = slot.lock();
            let transition = match entry.state() {
                EntryState::Ready => return future::ready(Ok(())).boxed(),
                EntryState::Loading => None,
                EntryState::Empty | EntryState::Error => {
                    entry.begin_loading();
                    Some(entry.clone())
                }
            };
            // Resolved under the slot lock so that the state check and joining or starting a fetch are atomic with
            // respect to the fetch completing.
            let fetch_key = key.fetch_key();
            let session = self.session();
            let fetch = self
                .dedup()
                .resolve(fetch_key.clone(), move || myself.fetch_and_apply(fetch_key, session));
            (fetch, transition)
        };

        if let Some(snapshot) = transition {
            trace!("[{}] LOADING({key})", self.name());
            self.fanout().notify(&snapshot);
        }

        async move { fetch.await.map(|_| ()) }.boxed()
    }

    /// Invalidate and load again. Skipped while an optimistic mutation of the entry is pending since its outcome is
    /// what the entry will hold anyway.
    pub fn refresh(&self, key: &CacheKey) -> Pending<()> {
        if self.get(key).is_some_and(|entry| entry.has_pending_mutation()) {
            return future::ready(Ok(())).boxed();
        }
        self.invalidate(key);
        self.ensure_loaded(key)
    }

    /// `true` unless the entry is ready and younger than [`stale_after`](Self::stale_after).
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.get(key)
            .is_none_or(|entry| entry.is_stale(self.stale_after()))
    }

    /// Register a callback for changes of a single entry. Dropping the returned handle unsubscribes.
    pub fn subscribe<F>(&self, key: CacheKey, callback: F) -> Result<Subscription<B>, SyncError>
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let fanout = self.fanout();
        let id = fanout.subscribe(key.clone(), callback);
        let sub_key = key.clone();
        child_build!(self, Subscription<B> { key: sub_key, id: id }).map_err(|err| {
            fanout.unsubscribe(&key, id);
            SyncError::Config(err.to_string())
        })
    }

    /// Drop every entry and cancel fetches in flight, e.g. on sign-out. Responses still on their way are discarded
    /// so they can't leak into the next session. Subscribers of known keys are told their entries are empty now.
    pub fn clear_all(&self) {
        let (session, cancelled) = {
            let _reset = self.reset_lock.write();
            let session = self.session.fetch_add(1, Ordering::AcqRel) + 1;
            let cancelled = self.dedup().cancel_all();
            self.clear_entries();
            self.clear_records();
            (session, cancelled)
        };
        debug!("[{}] cache cleared; session={session}, cancelled fetches={cancelled}", self.name());

        let fanout = self.fanout();
        for key in fanout.keys() {
            fanout.notify(&CacheEntry::new(key));
        }
    }

    /// Number of fetches currently in flight.
    pub fn fetches_in_flight(&self) -> usize {
        self.dedup().len()
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.fanout().subscriber_count(key)
    }

    pub(crate) fn record_of(&self, item: &ItemKey) -> Option<WatchRecord> {
        self.records().get(item)
    }

    pub(crate) fn remember_record(&self, item: &ItemKey, record: WatchRecord, session: u64) {
        if self.session() == session {
            self.records().insert(item.clone(), record);
        }
    }

    pub(crate) fn forget_record(&self, item: &ItemKey, session: u64) {
        if self.session() == session {
            self.records().invalidate(item);
        }
    }

    async fn fetch_and_apply(self: Arc<Self>, key: CacheKey, session: u64) -> Result<Value, SyncError> {
        let item = key.item().clone();
        let backend = self.backend();

        match key.kind() {
            EntityKind::AnimeStatus | EntityKind::Score => match backend.fetch_watch(item.slug()).await {
                Ok(record) => {
                    let record = record.unwrap_or_default();
                    let status = Value::Status(record.status);
                    if !self.apply_loaded(&CacheKey::status(&item), status, session) {
                        return Err(SyncError::Cancelled(key));
                    }
                    self.apply_loaded(&CacheKey::score(&item), Value::Score(record.score), session);
                    self.remember_record(&item, record, session);
                    Ok(status)
                }
                Err(err) if err.is_not_found() => {
                    let status = Value::empty_for(EntityKind::AnimeStatus);
                    if !self.apply_loaded(&CacheKey::status(&item), status, session) {
                        return Err(SyncError::Cancelled(key));
                    }
                    self.apply_loaded(&CacheKey::score(&item), Value::empty_for(EntityKind::Score), session);
                    Ok(status)
                }
                Err(err) => {
                    warn!("[{}] failed to load {key}: {err}", self.name());
                    self.apply_failed(&CacheKey::status(&item), session);
                    self.apply_failed(&CacheKey::score(&item), session);
                    Err(SyncError::NetworkFailure { key, source: err })
                }
            },
            EntityKind::Favourite => {
                let outcome = match backend.fetch_favourite(&item).await {
                    Err(err) if err.is_not_found() => Ok(false),
                    outcome => outcome,
                };
                match outcome {
                    Ok(favourite) => {
                        let value = Value::Favourite(favourite);
                        if !self.apply_loaded(&key, value, session) {
                            return Err(SyncError::Cancelled(key));
                        }
                        Ok(value)
                    }
                    Err(err) => {
                        warn!("[{}] failed to load {key}: {err}", self.name());
                        self.apply_failed(&key, session);
                        Err(SyncError::NetworkFailure { key, source: err })
                    }
                }
            }
        }
    }

    // Write a fetched value. Returns false if the fetch belongs to a cleared session. An entry with a pending
    // mutation is skipped: the mutation outcome is authoritative.
    pub(crate) fn apply_loaded(&self, key: &CacheKey, value: Value, session: u64) -> bool {
        if self.session() != session {
            trace!("[{}] discarding stale result for {key}", self.name());
            return false;
        }
        let slot = self.slot(key);
        let snapshot = {
            let mut entry = slot.lock();
            if self.session() != session {
                return false;
            }
            if entry.has_pending_mutation() {
                trace!("[{}] {key} has a pending mutation, fetched value ignored", self.name());
                return true;
            }
            entry.store(value, Instant::now());
            entry.clone()
        };
        trace!("[{}] LOADED({key}) = {value}", self.name());
        self.fanout().notify(&snapshot);
        true
    }

    fn apply_failed(&self, key: &CacheKey, session: u64) {
        if self.session() != session {
            return;
        }
        let Some(slot) = self.entries().get(key)
        else {
            return;
        };
        let snapshot = {
            let mut entry = slot.lock();
            if self.session() != session || !entry.fail() {
                return;
            }
            entry.clone()
        };
        self.fanout().notify(&snapshot);
    }
}
