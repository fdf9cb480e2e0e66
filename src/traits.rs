use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::ItemKey;
use crate::types::WatchRecord;

/// The remote catalog API as seen by the cache. Implemented by [`HttpBackend`](crate::http::HttpBackend) for the
/// real service and by test doubles.
///
/// Implementations report "no such record" as `Ok(None)`/`Ok(false)` rather than an error wherever the method allows
/// it. Timeouts and retries, if any, belong here too: the cache treats every error as terminal for that attempt.
#[async_trait]
pub trait CatalogBackend: Send + Sync + 'static {
    /// `GET /watch/{slug}`. `None` when nothing is recorded for the item.
    async fn fetch_watch(&self, slug: &str) -> Result<Option<WatchRecord>, ApiError>;

    /// `PUT /watch/{slug}`. Returns the stored record when the server echoes it back.
    async fn put_watch(&self, slug: &str, record: &WatchRecord) -> Result<Option<WatchRecord>, ApiError>;

    /// `DELETE /watch/{slug}`. The returned flag is the server's `success` field.
    async fn delete_watch(&self, slug: &str) -> Result<bool, ApiError>;

    /// `GET /favourite/{content}/{slug}`.
    async fn fetch_favourite(&self, item: &ItemKey) -> Result<bool, ApiError>;

    async fn put_favourite(&self, item: &ItemKey) -> Result<(), ApiError>;

    async fn delete_favourite(&self, item: &ItemKey) -> Result<(), ApiError>;
}
