//! Item-level operations used by list cards and detail screens.

use tracing::debug;

use crate::prelude::*;

impl<B> SyncContext<B>
where
    B: CatalogBackend,
{
    /// Cached watch status, possibly stale. `None` until loaded.
    pub fn get_status(&self, item: impl Into<ItemKey>) -> Option<WatchStatus> {
        self.get(&CacheKey::status(item))
            .and_then(|entry| entry.value())
            .and_then(|value| value.as_status())
    }

    pub fn get_score(&self, item: impl Into<ItemKey>) -> Option<Score> {
        self.get(&CacheKey::score(item))
            .and_then(|entry| entry.value())
            .and_then(|value| value.as_score())
    }

    /// `None` means "not loaded yet", not "not a favourite".
    pub fn get_favourite(&self, item: impl Into<ItemKey>) -> Option<bool> {
        self.get(&CacheKey::favourite(item))
            .and_then(|entry| entry.value())
            .and_then(|value| value.as_favourite())
    }

    /// Card mount: subscribe to one aspect of an item. Same as [`subscribe()`](Self::subscribe).
    pub fn watch<F>(&self, kind: EntityKind, item: impl Into<ItemKey>, callback: F) -> Result<Subscription<B>, SyncError>
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.subscribe(CacheKey::new(kind, item), callback)
    }

    pub fn fetch_status(&self, item: impl Into<ItemKey>) -> Pending<()> {
        self.ensure_loaded(&CacheKey::status(item))
    }

    pub fn fetch_score(&self, item: impl Into<ItemKey>) -> Pending<()> {
        self.ensure_loaded(&CacheKey::score(item))
    }

    pub fn fetch_favourite(&self, item: impl Into<ItemKey>) -> Pending<()> {
        self.ensure_loaded(&CacheKey::favourite(item))
    }

    /// Change the watch status. [`WatchStatus::None`] removes the item from the list (`DELETE /watch/{slug}`), which
    /// also clears its score once confirmed.
    pub fn set_status(&self, item: impl Into<ItemKey>, status: WatchStatus) -> Pending<Value> {
        let item = item.into();
        let backend = self.backend();
        let session = self.session();
        let ctx = self.myself();
        let slug = item.slug().to_string();
        let target = item.clone();

        if status.is_none() {
            return self.mutate(&item, Value::Status(status), move || async move {
                if !backend.delete_watch(&slug).await? {
                    return Err(ApiError::Rejected(format!("removal of '{slug}' was not acknowledged")));
                }
                if let Some(ctx) = ctx {
                    ctx.apply_loaded(&CacheKey::score(&target), Value::Score(Score::unrated()), session);
                    ctx.forget_record(&target, session);
                }
                Ok(Value::Status(WatchStatus::None))
            });
        }

        let known = self.known_record(&item);
        let name = self.name();

        self.mutate(&item, Value::Status(status), move || async move {
            let mut record = base_record(backend.as_ref(), &slug, known).await?;
            record.status = status;
            debug!("[{name}] PUT watch {slug}: {record:?}");
            let stored = backend.put_watch(&slug, &record).await?.unwrap_or(record);
            if let Some(ctx) = ctx {
                ctx.apply_loaded(&CacheKey::score(&target), Value::Score(stored.score), session);
                ctx.remember_record(&target, stored.clone(), session);
            }
            Ok(Value::Status(stored.status))
        })
    }

    /// Rate an item. Scores use the doubled scale, see [`Score`]. Rating an item that is not on the list yet adds it
    /// as [`WatchStatus::Completed`].
    pub fn set_score(&self, item: impl Into<ItemKey>, score: Score) -> Pending<Value> {
        let item = item.into();
        let backend = self.backend();
        let session = self.session();
        let ctx = self.myself();
        let slug = item.slug().to_string();
        let target = item.clone();
        let known = self.known_record(&item);
        let name = self.name();

        self.mutate(&item, Value::Score(score), move || async move {
            let mut record = base_record(backend.as_ref(), &slug, known).await?;
            if record.status.is_none() {
                record.status = WatchStatus::Completed;
            }
            record.score = score;
            debug!("[{name}] PUT watch {slug}: {record:?}");
            let stored = backend.put_watch(&slug, &record).await?.unwrap_or(record);
            if let Some(ctx) = ctx {
                ctx.apply_loaded(&CacheKey::status(&target), Value::Status(stored.status), session);
                ctx.remember_record(&target, stored.clone(), session);
            }
            Ok(Value::Score(stored.score))
        })
    }

    pub fn set_favourite(&self, item: impl Into<ItemKey>, favourite: bool) -> Pending<Value> {
        let item = item.into();
        let backend = self.backend();
        let target = item.clone();

        self.mutate(&item, Value::Favourite(favourite), move || async move {
            if favourite {
                backend.put_favourite(&target).await?;
            }
            else {
                backend.delete_favourite(&target).await?;
            }
            Ok(Value::Favourite(favourite))
        })
    }

    /// The last full record seen, overlaid with what the cache holds. `None` if the record was never fetched.
    fn known_record(&self, item: &ItemKey) -> Option<WatchRecord> {
        let mut record = self.record_of(item)?;
        if let Some(status) = self.get_status(item) {
            record.status = status;
        }
        if let Some(score) = self.get_score(item) {
            record.score = score;
        }
        Some(record)
    }
}

// The record a `PUT /watch/{slug}` starts from. Unknown records are fetched first so the fields the cache doesn't
// track (episodes, rewatches, note) and the untouched half of status/score survive the write.
async fn base_record<B>(backend: &B, slug: &str, known: Option<WatchRecord>) -> Result<WatchRecord, ApiError>
where
    B: CatalogBackend,
{
    if let Some(record) = known {
        return Ok(record);
    }
    match backend.fetch_watch(slug).await {
        Ok(record) => Ok(record.unwrap_or_default()),
        Err(err) if err.is_not_found() => Ok(WatchRecord::default()),
        Err(err) => Err(err),
    }
}
