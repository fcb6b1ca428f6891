// tests/scheduler_poll.rs
//
// Poll loop behavior under paused tokio time: fixed cadence, initial-load
// retry until first success, and the rule that a failed poll never stops the
// loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use channel_feed_mirror::fetch::{FeedFetch, FetchError};
use channel_feed_mirror::item::{FeedItem, SortDirection};
use channel_feed_mirror::scheduler::spawn_poller;
use channel_feed_mirror::sync::Synchronizer;

fn item(id: i64, secs: i64) -> FeedItem {
    FeedItem {
        id,
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        channel: "newsroom".into(),
        text: format!("msg {id}"),
        views: None,
        forwards: None,
        replies: None,
        has_media: false,
        media_type: None,
        edited: false,
        pinned: false,
    }
}

fn unavailable() -> FetchError {
    FetchError::Status {
        status: 503,
        status_text: "Service Unavailable".into(),
    }
}

/// Scripted feed that counts calls to each endpoint.
struct ScriptedFeed {
    window: Mutex<VecDeque<Result<Vec<FeedItem>, FetchError>>>,
    latest: Mutex<VecDeque<Result<Vec<FeedItem>, FetchError>>>,
    window_calls: AtomicUsize,
    latest_calls: AtomicUsize,
}

impl ScriptedFeed {
    fn new(
        window: Vec<Result<Vec<FeedItem>, FetchError>>,
        latest: Vec<Result<Vec<FeedItem>, FetchError>>,
    ) -> Self {
        Self {
            window: Mutex::new(window.into()),
            latest: Mutex::new(latest.into()),
            window_calls: AtomicUsize::new(0),
            latest_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FeedFetch for ScriptedFeed {
    async fn latest_messages(&self, _: &str, _: usize) -> Result<Vec<FeedItem>, FetchError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let mut q = self.latest.lock().unwrap();
        q.pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn recent_messages(&self, _: &str, _: u32) -> Result<Vec<FeedItem>, FetchError> {
        self.window_calls.fetch_add(1, Ordering::SeqCst);
        let mut q = self.window.lock().unwrap();
        q.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

#[tokio::test(start_paused = true)]
async fn polls_run_on_the_configured_interval() {
    let feed = Arc::new(ScriptedFeed::new(
        vec![Ok(vec![item(1, 10)])],
        vec![
            Ok(vec![item(2, 20)]),
            Ok(vec![item(3, 30)]),
            Ok(vec![item(4, 40)]),
        ],
    ));
    let sync = Arc::new(Synchronizer::new(
        Arc::clone(&feed) as Arc<dyn FeedFetch>,
        "newsroom",
        10,
        1,
        SortDirection::Descending,
    ));
    sync.initial_load().await.expect("initial load");

    let _poller = spawn_poller(Arc::clone(&sync), 5);

    // Three full intervals.
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(feed.latest_calls.load(Ordering::SeqCst), 3);
    assert_eq!(sync.store().len(), 4);

    // No hidden extra fetches between ticks.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(feed.latest_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn poller_retries_initial_load_until_it_succeeds() {
    let feed = Arc::new(ScriptedFeed::new(
        vec![
            Err(unavailable()),
            Err(unavailable()),
            Ok(vec![item(7, 70)]),
        ],
        vec![Ok(vec![item(8, 80)])],
    ));
    let sync = Arc::new(Synchronizer::new(
        Arc::clone(&feed) as Arc<dyn FeedFetch>,
        "newsroom",
        10,
        1,
        SortDirection::Descending,
    ));
    // First attempt fails inline, as a subscribe call would see it.
    sync.initial_load().await.expect_err("scripted failure");
    assert!(!sync.store().is_loaded());

    let _poller = spawn_poller(Arc::clone(&sync), 5);

    // Tick 1 retries the window (fails again), tick 2 succeeds, tick 3 is
    // the first incremental sync.
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(sync.store().is_loaded());
    assert_eq!(feed.window_calls.load(Ordering::SeqCst), 3);
    assert_eq!(feed.latest_calls.load(Ordering::SeqCst), 1);

    let mut ids: Vec<i64> = sync.store().snapshot().items.iter().map(|i| i.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![7, 8], "incremental only starts after the window lands");
}

#[tokio::test(start_paused = true)]
async fn failed_polls_do_not_stop_the_loop() {
    let feed = Arc::new(ScriptedFeed::new(
        vec![Ok(Vec::new())],
        vec![
            Err(unavailable()),
            Err(unavailable()),
            Ok(vec![item(9, 90)]),
        ],
    ));
    let sync = Arc::new(Synchronizer::new(
        Arc::clone(&feed) as Arc<dyn FeedFetch>,
        "newsroom",
        10,
        1,
        SortDirection::Descending,
    ));
    sync.initial_load().await.expect("initial load");

    let poller = spawn_poller(Arc::clone(&sync), 5);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(!poller.is_finished(), "errors must not kill the poll loop");
    assert_eq!(feed.latest_calls.load(Ordering::SeqCst), 3);
    assert_eq!(sync.store().last_seen_id(), Some(9));
    assert_eq!(sync.store().snapshot().last_error, None, "cleared by the success");
}
