#![cfg(feature = "mock")]

use parking_lot::Mutex;
use std::sync::Arc;
use watch_cache::prelude::*;
use watch_cache::test::mock::MockBackend;

macro_rules! context {
    ($backend:expr) => {
        SyncContext::builder()
            .backend($backend.clone())
            .build()
            .expect("sync context")
    };
}

#[tokio::test]
async fn dropping_the_handle_unsubscribes() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context!(backend);
    let key = CacheKey::status("monster");

    let sub = ctx
        .watch(EntityKind::AnimeStatus, "monster", |_| {})
        .expect("subscription");
    assert_eq!(sub.key(), &key);
    assert_eq!(ctx.subscriber_count(&key), 1);

    drop(sub);
    assert_eq!(ctx.subscriber_count(&key), 0);
    assert_eq!(ctx.notify(&key), 0);
}

#[tokio::test]
async fn unsubscribe_is_idempotent() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context!(backend);
    let key = CacheKey::favourite("death-note");

    let first = ctx.subscribe(key.clone(), |_| {}).expect("first");
    let _second = ctx.subscribe(key.clone(), |_| {}).expect("second");
    assert_eq!(ctx.subscriber_count(&key), 2);

    first.unsubscribe();
    first.unsubscribe();
    assert_eq!(ctx.subscriber_count(&key), 1);
    drop(first);
    assert_eq!(ctx.subscriber_count(&key), 1, "the other subscriber must survive");
}

#[tokio::test]
async fn late_subscriber_receives_the_fetch_in_flight() {
    let backend = Arc::new(MockBackend::new().with_watch(
        "monster",
        WatchRecord {
            status: WatchStatus::OnHold,
            ..Default::default()
        },
    ));
    let ctx = context!(backend);

    backend.hold();
    let load = ctx.fetch_status("monster");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = seen.clone();
        ctx.subscribe(CacheKey::status("monster"), move |entry| {
            seen.lock().push((entry.state(), entry.value()));
        })
        .expect("subscription")
    };

    backend.open();
    load.await.expect("load");

    assert_eq!(
        *seen.lock(),
        vec![(EntryState::Ready, Some(Value::Status(WatchStatus::OnHold)))]
    );
}

#[tokio::test]
async fn callbacks_may_read_the_context() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context!(backend);
    let key = CacheKey::favourite("death-note");

    let observed = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let observed = observed.clone();
        let reader = ctx.clone();
        ctx.subscribe(key.clone(), move |entry| {
            // The cache is not locked while callbacks run.
            let current = reader.get(entry.key()).and_then(|e| e.value());
            observed.lock().push((entry.value(), current));
        })
        .expect("subscription")
    };

    ctx.set(&ItemKey::anime("death-note"), Value::Favourite(true));

    assert_eq!(
        *observed.lock(),
        vec![(Some(Value::Favourite(true)), Some(Value::Favourite(true)))]
    );
}
