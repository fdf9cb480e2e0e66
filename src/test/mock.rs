use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    FetchWatch,
    PutWatch,
    DeleteWatch,
    FetchFavourite,
    PutFavourite,
    DeleteFavourite,
}

impl MockOp {
    fn is_read(&self) -> bool {
        matches!(self, Self::FetchWatch | Self::FetchFavourite)
    }
}

/// In-memory catalog API.
///
/// Every call is counted first, then optionally parked on the gate (see [`MockBackend::hold()`]), then delayed by the
/// configured latency, and only then served or failed.
#[derive(Debug)]
pub struct MockBackend {
    watch:         Mutex<HashMap<String, WatchRecord>>,
    favourites:    Mutex<HashSet<ItemKey>>,
    calls:         Mutex<HashMap<MockOp, usize>>,
    puts:          Mutex<Vec<(String, WatchRecord)>>,
    latency:       Mutex<Duration>,
    held:          AtomicBool,
    gate:          Semaphore,
    fail_reads:    AtomicBool,
    fail_writes:   AtomicBool,
    reject_delete: AtomicBool,
    echo_puts:     AtomicBool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            watch:         Mutex::new(HashMap::new()),
            favourites:    Mutex::new(HashSet::new()),
            calls:         Mutex::new(HashMap::new()),
            puts:          Mutex::new(Vec::new()),
            latency:       Mutex::new(Duration::ZERO),
            held:          AtomicBool::new(false),
            gate:          Semaphore::new(0),
            fail_reads:    AtomicBool::new(false),
            fail_writes:   AtomicBool::new(false),
            reject_delete: AtomicBool::new(false),
            echo_puts:     AtomicBool::new(false),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watch<S: Into<String>>(self, slug: S, record: WatchRecord) -> Self {
        self.watch.lock().insert(slug.into(), record);
        self
    }

    pub fn with_favourite(self, item: impl Into<ItemKey>) -> Self {
        self.favourites.lock().insert(item.into());
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Make PUT /watch answer with the stored record instead of a bare acknowledgement.
    pub fn with_echo(self) -> Self {
        self.echo_puts.store(true, Ordering::SeqCst);
        self
    }

    /// Park every subsequent call until [`release()`](Self::release) lets it through.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let `n` parked (or future) calls proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Stop parking calls and let the parked ones through.
    pub fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make DELETE /watch answer `{"success": false}`.
    pub fn reject_delete(&self, reject: bool) {
        self.reject_delete.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Bodies of every PUT /watch received, in order.
    pub fn puts(&self) -> Vec<(String, WatchRecord)> {
        self.puts.lock().clone()
    }

    /// Change the server-side record behind the cache's back.
    pub fn replace_watch<S: Into<String>>(&self, slug: S, record: WatchRecord) {
        self.watch.lock().insert(slug.into(), record);
    }

    pub fn stored_watch(&self, slug: &str) -> Option<WatchRecord> {
        self.watch.lock().get(slug).cloned()
    }

    pub fn is_favourite(&self, item: impl Into<ItemKey>) -> bool {
        self.favourites.lock().contains(&item.into())
    }

    async fn enter(&self, op: MockOp) -> Result<(), ApiError> {
        *self.calls.lock().entry(op).or_default() += 1;

        if self.held.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .map_err(|e| ApiError::Rejected(e.to_string()))?
                .forget();
        }

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failing = if op.is_read() {
            self.fail_reads.load(Ordering::SeqCst)
        }
        else {
            self.fail_writes.load(Ordering::SeqCst)
        };
        if failing {
            return Err(ApiError::Status {
                status: 503,
                path:   format!("{op:?}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogBackend for MockBackend {
    async fn fetch_watch(&self, slug: &str) -> Result<Option<WatchRecord>, ApiError> {
        self.enter(MockOp::FetchWatch).await?;
        Ok(self.watch.lock().get(slug).cloned())
    }

    async fn put_watch(&self, slug: &str, record: &WatchRecord) -> Result<Option<WatchRecord>, ApiError> {
        self.enter(MockOp::PutWatch).await?;
        self.puts.lock().push((slug.to_string(), record.clone()));
        self.watch.lock().insert(slug.to_string(), record.clone());
        Ok(self.echo_puts.load(Ordering::SeqCst).then(|| record.clone()))
    }

    async fn delete_watch(&self, slug: &str) -> Result<bool, ApiError> {
        self.enter(MockOp::DeleteWatch).await?;
        if self.reject_delete.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.watch.lock().remove(slug);
        Ok(true)
    }

    async fn fetch_favourite(&self, item: &ItemKey) -> Result<bool, ApiError> {
        self.enter(MockOp::FetchFavourite).await?;
        Ok(self.favourites.lock().contains(item))
    }

    async fn put_favourite(&self, item: &ItemKey) -> Result<(), ApiError> {
        self.enter(MockOp::PutFavourite).await?;
        self.favourites.lock().insert(item.clone());
        Ok(())
    }

    async fn delete_favourite(&self, item: &ItemKey) -> Result<(), ApiError> {
        self.enter(MockOp::DeleteFavourite).await?;
        self.favourites.lock().remove(item);
        Ok(())
    }
}
