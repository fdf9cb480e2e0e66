use std::time::Duration;
use std::time::Instant;

use crate::types::CacheKey;
use crate::types::EntityKind;
use crate::types::ItemKey;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryState {
    #[default]
    Empty,
    Loading,
    Ready,
    Error,
}

/// Rollback target of an optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    previous_value: Option<Value>,
    previous_state: EntryState,
    submitted_at:   Instant,
}

impl PendingMutation {
    pub fn previous_value(&self) -> Option<Value> {
        self.previous_value
    }

    pub fn previous_state(&self) -> EntryState {
        self.previous_state
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

/// Snapshot of a cache entry. Subscribers and readers always get a copy; the live entry stays behind the context's
/// slot lock.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key:              CacheKey,
    value:            Option<Value>,
    state:            EntryState,
    fetched_at:       Option<Instant>,
    pending_mutation: Option<PendingMutation>,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey) -> Self {
        Self {
            key,
            value: None,
            state: EntryState::Empty,
            fetched_at: None,
            pending_mutation: None,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn kind(&self) -> EntityKind {
        self.key.kind()
    }

    pub fn item(&self) -> &ItemKey {
        self.key.item()
    }

    /// The last known value. May be present while the entry is not `Ready`: an invalidated entry keeps its stale
    /// value until the refetch lands.
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EntryState::Ready
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    pub fn pending_mutation(&self) -> Option<&PendingMutation> {
        self.pending_mutation.as_ref()
    }

    pub fn has_pending_mutation(&self) -> bool {
        self.pending_mutation.is_some()
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        !self.is_ready() || self.fetched_at.is_none_or(|at| at.elapsed() >= max_age)
    }

    pub(crate) fn begin_loading(&mut self) {
        self.state = EntryState::Loading;
    }

    pub(crate) fn store(&mut self, value: Value, now: Instant) {
        self.value = Some(value);
        self.state = EntryState::Ready;
        self.fetched_at = Some(now);
    }

    // Only a loading entry can fail; a value written meanwhile by `set` stays valid.
    pub(crate) fn fail(&mut self) -> bool {
        if self.state == EntryState::Loading {
            self.state = EntryState::Error;
            return true;
        }
        false
    }

    pub(crate) fn invalidate(&mut self) -> bool {
        match self.state {
            EntryState::Ready | EntryState::Error => {
                self.state = EntryState::Empty;
                true
            }
            EntryState::Empty | EntryState::Loading => false,
        }
    }

    pub(crate) fn begin_mutation(&mut self, value: Value, now: Instant) {
        self.pending_mutation = Some(PendingMutation {
            previous_value: self.value,
            previous_state: self.state,
            submitted_at:   now,
        });
        self.value = Some(value);
        self.state = EntryState::Ready;
    }

    pub(crate) fn confirm_mutation(&mut self, value: Value, now: Instant) {
        self.pending_mutation = None;
        self.store(value, now);
    }

    pub(crate) fn rollback_mutation(&mut self) {
        if let Some(pending) = self.pending_mutation.take() {
            self.value = pending.previous_value;
            // A fetch that was in flight skipped this entry because of the mutation, so nothing is loading it anymore.
            self.state = match pending.previous_state {
                EntryState::Loading => EntryState::Empty,
                state => state,
            };
        }
    }
}
