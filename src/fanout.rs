use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::entry::CacheEntry;
use crate::types::CacheKey;

pub type Callback = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// Per-key observer registry.
///
/// Callbacks are invoked synchronously, in registration order, and with no lock held. A callback is free to read the
/// cache or to (un)subscribe; a callback registered during a notification is not called by that notification.
#[derive(Default)]
pub struct Fanout {
    subscribers: Mutex<HashMap<CacheKey, Vec<(u64, Callback)>>>,
    next_id:     AtomicU64,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. The returned id is what [`Fanout::unsubscribe()`] expects.
    pub fn subscribe<F>(&self, key: CacheKey, callback: F) -> u64
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Idempotent. Returns `false` if there was nothing to remove.
    pub fn unsubscribe(&self, key: &CacheKey, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(list) = subscribers.get_mut(key)
        else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(key);
        }
        removed
    }

    /// Call every subscriber of the entry's key. Returns the number of callbacks invoked.
    pub fn notify(&self, entry: &CacheEntry) -> usize {
        let callbacks = self
            .subscribers
            .lock()
            .get(entry.key())
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect::<Vec<_>>())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(entry);
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.subscribers.lock().get(key).map_or(0, |list| list.len())
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.subscribers.lock().keys().cloned().collect()
    }
}

impl Debug for Fanout {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.lock();
        fmt.debug_map()
            .entries(subscribers.iter().map(|(k, list)| (k.to_string(), list.len())))
            .finish()
    }
}
