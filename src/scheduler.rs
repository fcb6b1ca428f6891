// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{trace, warn};

use crate::sync::{SyncOutcome, Synchronizer};

/// Handle to a running poll loop.
///
/// Cancellation is first-class: `cancel` (or dropping the handle) aborts the
/// task, which lands on the fetch await point, so an in-flight fetch's result
/// is discarded before it can be applied. No orphaned timers survive a feed
/// switch or teardown.
#[derive(Debug)]
pub struct PollerHandle {
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Spawn the fixed-interval poll loop for one channel.
///
/// Each tick retries the initial load until it has succeeded once, then runs
/// incremental syncs. Fetch errors are logged and swallowed; a failed poll
/// never stops future polls, and there is no backoff: the retry cadence is
/// the poll interval itself.
pub fn spawn_poller(sync: Arc<Synchronizer>, interval_secs: u64) -> PollerHandle {
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a fresh interval completes immediately; consume
        // it so the loop waits a full period before the first poll.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if !sync.store().is_loaded() {
                if let Err(e) = sync.initial_load().await {
                    warn!(channel = %sync.channel(), error = %e, "initial load retry failed");
                }
                continue;
            }

            match sync.sync_once().await {
                Ok(SyncOutcome::Merged(stats)) => {
                    trace!(channel = %sync.channel(), total = stats.total, "poll tick merged");
                }
                Ok(SyncOutcome::Skipped) => {
                    trace!(channel = %sync.channel(), "poll tick skipped");
                }
                Err(_) => {
                    // Already recorded on the store and logged by sync_once.
                }
            }
        }
    });

    PollerHandle { join }
}
