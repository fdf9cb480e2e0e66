use crate::prelude::*;
use fieldx_plus::fx_plus;
use std::fmt::Debug;

/// Observer registration tied to the lifetime of a UI element. Created by
/// [`SyncContext::subscribe()`](crate::SyncContext::subscribe); dropping it unsubscribes.
#[fx_plus(child(SyncContext<B>, rc_strong), sync, default(off))]
pub struct Subscription<B>
where
    B: CatalogBackend,
{
    key: CacheKey,
    id:  u64,
}

impl<B> Subscription<B>
where
    B: CatalogBackend,
{
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Stop receiving notifications. Calling it more than once, or letting the handle drop afterwards, is harmless.
    pub fn unsubscribe(&self) {
        self.parent().fanout().unsubscribe(&self.key, self.id);
    }
}

impl<B> Drop for Subscription<B>
where
    B: CatalogBackend,
{
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<B> Debug for Subscription<B>
where
    B: CatalogBackend,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
