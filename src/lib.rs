//! # watch-cache
//!
//! Client-side cache for the per-item state of an anime tracker: watch status, score and the favourite flag.
//!
//! A catalog screen renders dozens of cards at once and every one of them wants to know whether its item is on the
//! user's list. Left alone, each card would poll the same endpoint, overwrite each other's results out of order and
//! lose track of what the user just tapped. This crate sits between the cards and the API and keeps them coherent.
//!
//! # The Basics
//!
//! - Keys are catalog items ([`ItemKey`](types::ItemKey)), paired with the aspect being cached
//!   ([`EntityKind`](types::EntityKind)) into a [`CacheKey`](types::CacheKey).
//! - Reads are synchronous. A card renders whatever [`SyncContext::get()`] has and asks for a load with
//!   [`SyncContext::ensure_loaded()`].
//! - Concurrent loads of the same key are collapsed into one request by the [`Deduplicator`](dedup::Deduplicator).
//!   Status and score share a request since the API returns both at once.
//! - Writes are optimistic. [`SyncContext::mutate()`] updates the cache before returning and rolls it back if the
//!   server refuses. Only one write per key may be pending at a time.
//! - Every change to an entry is pushed to the subscribers of that entry, and only to them.
//! - [`SyncContext::clear_all()`] resets everything on sign-out; responses from before the reset are dropped.
//!
//! The backend is abstracted by [`CatalogBackend`]. [`HttpBackend`](http::HttpBackend) talks to the real REST API.
//!
//! # Scores
//!
//! Scores are kept on a doubled scale: `1..=10` stand for `0.5..=5.0` stars, odd numbers being half stars. Use
//! [`Score::from_stars()`](types::Score::from_stars) to convert a star tap rather than doing the math by hand.

pub mod cache;
pub mod dedup;
pub mod entry;
pub mod error;
pub mod fanout;
pub mod http;
mod mutation;
mod status;
pub mod subscription;
pub mod test;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::SyncContext;
#[doc(inline)]
pub use traits::CatalogBackend;

pub mod prelude {
    pub use crate::cache::SyncContext;
    pub use crate::entry::CacheEntry;
    pub use crate::entry::EntryState;
    pub use crate::entry::PendingMutation;
    pub use crate::error::ApiError;
    pub use crate::error::ErrorKind;
    pub use crate::error::SyncError;
    pub use crate::subscription::Subscription;
    pub use crate::traits::CatalogBackend;
    pub use crate::types::*;
}
