#![cfg(feature = "mock")]

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use watch_cache::prelude::*;
use watch_cache::test::init_tracing;
use watch_cache::test::mock::MockBackend;
use watch_cache::test::mock::MockOp;

macro_rules! context {
    ($backend:expr) => {
        SyncContext::builder()
            .backend($backend.clone())
            .build()
            .expect("sync context")
    };
}

fn record(status: WatchStatus, score: u8) -> WatchRecord {
    WatchRecord {
        status,
        score: Score::new(score).expect("valid score"),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loads_from_many_threads_make_one_request() {
    init_tracing();
    let backend = Arc::new(
        MockBackend::new()
            .with_latency(Duration::from_millis(20))
            .with_watch("attack-on-titan", record(WatchStatus::Watching, 8)),
    );
    let ctx = context!(backend);

    let loaders = (0..32)
        .map(|n| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if n % 2 == 0 {
                    ctx.fetch_status("attack-on-titan").await
                }
                else {
                    ctx.fetch_score("attack-on-titan").await
                }
            })
        })
        .collect::<Vec<_>>();

    for outcome in join_all(loaders).await {
        outcome.expect("loader task").expect("load");
    }

    assert_eq!(backend.calls(MockOp::FetchWatch), 1);
    assert_eq!(ctx.get_status("attack-on-titan"), Some(WatchStatus::Watching));
    assert_eq!(ctx.get_score("attack-on-titan"), Some(Score::new(8).unwrap()));
    assert_eq!(ctx.fetches_in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_racing_loads_never_resurrects_old_values() {
    init_tracing();
    let backend = Arc::new(
        MockBackend::new()
            .with_latency(Duration::from_millis(15))
            .with_watch("monster", record(WatchStatus::Watching, 4)),
    );
    let ctx = context!(backend);

    let loaders = (0..16)
        .map(|_| {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.fetch_status("monster").await })
        })
        .collect::<Vec<_>>();

    tokio::time::sleep(Duration::from_millis(5)).await;
    ctx.clear_all();
    // Whatever is read from now on belongs to the new session.
    backend.replace_watch("monster", record(WatchStatus::Dropped, 2));

    for outcome in join_all(loaders).await {
        // Loads of the old session end up cancelled, later ones succeed.
        let _ = outcome.expect("loader task");
    }
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert!(matches!(
        ctx.get_status("monster"),
        None | Some(WatchStatus::Dropped)
    ));
    assert!(matches!(ctx.get_score("monster").map(Score::raw), None | Some(2)));

    ctx.fetch_status("monster").await.expect("fresh load");
    assert_eq!(ctx.get_status("monster"), Some(WatchStatus::Dropped));
    assert_eq!(ctx.get_score("monster"), Some(Score::new(2).unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mutations_racing_a_reset_never_stay_pending() {
    init_tracing();
    let backend = Arc::new(MockBackend::new().with_latency(Duration::from_millis(1)));
    let ctx = context!(backend);
    let key = CacheKey::favourite("death-note");

    for round in 0..25 {
        let favourite = round % 2 == 0;
        let writer = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.set_favourite("death-note", favourite).await })
        };
        let resetter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.clear_all() })
        };

        let outcome = writer.await.expect("writer task");
        resetter.await.expect("reset task");

        let entry = ctx.get(&key);
        assert!(
            entry.as_ref().is_none_or(|e| !e.has_pending_mutation()),
            "round {round}: entry left pending: {entry:?}"
        );
        if let Some(value) = entry.and_then(|e| e.value()) {
            // A value visible after the reset can only come from a write that was accepted in the new session.
            assert_eq!(value, Value::Favourite(favourite), "round {round}");
            assert!(outcome.is_ok(), "round {round}: {outcome:?}");
        }

        // The entry accepts the next write in any case.
        ctx.set_favourite("death-note", favourite)
            .await
            .expect("follow-up write");
        ctx.clear_all();
    }
}
