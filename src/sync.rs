//! # Synchronizer
//! Binds one channel to one [`FeedStore`] and drives the two fetch modes:
//! a full initial load and the cheap incremental catch-up.
//!
//! Only one sync reduces into the store at a time. Overlap is rejected with
//! [`SyncOutcome::Skipped`] rather than queued; the next interval tick covers
//! whatever the skipped call would have fetched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::fetch::{FeedFetch, FetchError};
use crate::item::SortDirection;
use crate::store::{FeedStore, MergeStats};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Incremental sync attempts.");
        describe_counter!("sync_skipped_total", "Syncs skipped because one was in flight.");
        describe_counter!("sync_errors_total", "Failed sync fetches.");
        describe_counter!("sync_items_inserted_total", "Newly seen items merged in.");
        describe_counter!("sync_items_refreshed_total", "Already-seen items overwritten in place.");
        describe_counter!("sync_fetch_non_2xx_total", "Feed responses with a non-2xx status.");
        describe_gauge!("feed_items", "Items currently held in the mirror.");
        describe_gauge!("sync_last_run_ts", "Unix ts of the last successful sync.");
        describe_histogram!("sync_fetch_ms", "Feed fetch time in milliseconds.");
    });
}

/// Result of one [`Synchronizer::sync_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The fetch ran and its items were folded into the store.
    Merged(MergeStats),
    /// Another sync was in flight; nothing was fetched.
    Skipped,
}

pub struct Synchronizer {
    fetcher: Arc<dyn FeedFetch>,
    store: Arc<FeedStore>,
    channel: String,
    latest_limit: usize,
    window_hours: u32,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a sync leaves scope on any path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Synchronizer {
    pub fn new(
        fetcher: Arc<dyn FeedFetch>,
        channel: impl Into<String>,
        latest_limit: usize,
        window_hours: u32,
        direction: SortDirection,
    ) -> Self {
        ensure_metrics_described();
        Self {
            fetcher,
            store: Arc::new(FeedStore::new(direction)),
            channel: channel.into(),
            latest_limit,
            window_hours,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn store(&self) -> &Arc<FeedStore> {
        &self.store
    }

    /// Full load of the recent window, replacing any held state.
    ///
    /// The only operation allowed to replace the store wholesale. Runs before
    /// any incremental sync for this channel; on failure the previous state
    /// stays untouched and the error is surfaced for display.
    pub async fn initial_load(&self) -> Result<usize, FetchError> {
        self.store.begin_initial_load();
        match self
            .fetcher
            .recent_messages(&self.channel, self.window_hours)
            .await
        {
            Ok(items) => {
                let n = self.store.apply_initial(items);
                gauge!("feed_items").set(n as f64);
                info!(channel = %self.channel, items = n, "initial feed load complete");
                Ok(n)
            }
            Err(e) => {
                counter!("sync_errors_total").increment(1);
                warn!(channel = %self.channel, error = %e, "initial feed load failed");
                self.store.fail_initial(&e);
                Err(e)
            }
        }
    }

    /// One incremental catch-up: fetch the bounded latest window and merge by
    /// id. Never raises the loading flag; a failed fetch records the error
    /// and leaves the store content untouched.
    pub async fn sync_once(&self) -> Result<SyncOutcome, FetchError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            counter!("sync_skipped_total").increment(1);
            debug!(channel = %self.channel, "sync already in flight, skipping");
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        counter!("sync_runs_total").increment(1);
        match self
            .fetcher
            .latest_messages(&self.channel, self.latest_limit)
            .await
        {
            Ok(items) => {
                let stats = self.store.merge(items);
                counter!("sync_items_inserted_total").increment(stats.inserted as u64);
                counter!("sync_items_refreshed_total").increment(stats.refreshed as u64);
                gauge!("feed_items").set(stats.total as f64);
                gauge!("sync_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
                debug!(
                    channel = %self.channel,
                    inserted = stats.inserted,
                    refreshed = stats.refreshed,
                    total = stats.total,
                    "incremental sync merged"
                );
                Ok(SyncOutcome::Merged(stats))
            }
            Err(e) => {
                counter!("sync_errors_total").increment(1);
                warn!(channel = %self.channel, source = self.fetcher.name(), error = %e, "sync fetch failed");
                self.store.record_sync_error(&e);
                Err(e)
            }
        }
    }

    /// Reorder the held items. Zero network calls.
    pub fn set_direction(&self, direction: SortDirection) -> bool {
        self.store.set_direction(direction)
    }
}
