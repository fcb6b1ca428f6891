//! # Feed Mirror
//! Top-level service: at most one watched channel at a time, each watch a
//! fresh generation with its own store and poller.
//!
//! Generations never share state. Switching channels cancels the old poller
//! and builds a new synchronizer from scratch, so a response belonging to a
//! superseded channel has no path into the current store.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use crate::config::SyncConfig;
use crate::fetch::{FeedFetch, FetchError};
use crate::item::{normalize_channel, SortDirection};
use crate::scheduler::{spawn_poller, PollerHandle};
use crate::store::FeedSnapshot;
use crate::sync::Synchronizer;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),
    /// The watch is installed and retrying on the poll interval; the error is
    /// also recorded on the store for display.
    #[error(transparent)]
    Initial(#[from] FetchError),
}

struct Watched {
    generation: u64,
    sync: Arc<Synchronizer>,
    poller: PollerHandle,
}

pub struct FeedMirror {
    fetcher: Arc<dyn FeedFetch>,
    cfg: SyncConfig,
    active: Mutex<Option<Watched>>,
    generations: Mutex<u64>,
}

/// Status block for diagnostics endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MirrorStatus {
    pub channel: Option<String>,
    pub generation: u64,
    pub items: usize,
    pub last_seen_id: Option<i64>,
    pub direction: SortDirection,
    pub initial_loading: bool,
    pub last_error: Option<String>,
    pub revision: u64,
}

impl FeedMirror {
    pub fn new(fetcher: Arc<dyn FeedFetch>, cfg: SyncConfig) -> Self {
        Self {
            fetcher,
            cfg,
            active: Mutex::new(None),
            generations: Mutex::new(0),
        }
    }

    /// Switch the watched channel.
    ///
    /// Cancels the previous generation's poller, runs the initial load inline
    /// (the caller learns immediately whether the channel is reachable), then
    /// starts the poll loop. The consumer's current sort direction carries
    /// over to the fresh store; nothing else does.
    pub async fn watch(&self, raw_channel: &str) -> Result<String, WatchError> {
        let channel = normalize_channel(raw_channel)
            .ok_or_else(|| WatchError::InvalidChannel(raw_channel.to_string()))?;

        let direction = self
            .snapshot()
            .map(|s| s.direction)
            .unwrap_or_default();

        let generation = {
            let mut g = self.generations.lock().expect("generation mutex poisoned");
            *g += 1;
            *g
        };

        let sync = Arc::new(Synchronizer::new(
            Arc::clone(&self.fetcher),
            channel.clone(),
            self.cfg.latest_limit,
            self.cfg.window_hours,
            direction,
        ));

        // Drop the previous watch before loading: its poller aborts at its
        // await point and its store is unreachable from here on.
        {
            let mut active = self.active.lock().expect("active watch mutex poisoned");
            if let Some(old) = active.take() {
                old.poller.cancel();
                info!(
                    old_generation = old.generation,
                    old_channel = %old.sync.channel(),
                    "superseding watched channel"
                );
            }
        }

        let initial = sync.initial_load().await;

        {
            let mut active = self.active.lock().expect("active watch mutex poisoned");
            let newest = *self.generations.lock().expect("generation mutex poisoned");
            if generation != newest {
                // A later watch() superseded this one while the initial load
                // was in flight. Its result must not be applied: leave the
                // newer generation in place and spawn nothing.
                info!(channel = %channel, generation, "watch superseded during initial load");
                return Ok(channel);
            }
            let poller = spawn_poller(Arc::clone(&sync), self.cfg.interval_secs);
            *active = Some(Watched {
                generation,
                sync,
                poller,
            });
        }
        info!(channel = %channel, generation, "watching channel");

        initial?;
        Ok(channel)
    }

    /// Stop watching. Cancels the poller and drops the store.
    pub fn stop(&self) {
        let mut active = self.active.lock().expect("active watch mutex poisoned");
        if let Some(old) = active.take() {
            old.poller.cancel();
            info!(channel = %old.sync.channel(), "stopped watching channel");
        }
    }

    pub fn current_channel(&self) -> Option<String> {
        let active = self.active.lock().expect("active watch mutex poisoned");
        active.as_ref().map(|w| w.sync.channel().to_string())
    }

    /// Read-only snapshot of the current generation's store, if any.
    pub fn snapshot(&self) -> Option<FeedSnapshot> {
        let active = self.active.lock().expect("active watch mutex poisoned");
        active.as_ref().map(|w| w.sync.store().snapshot())
    }

    /// Reorder the current mirror. No-op without a watched channel; never
    /// fetches either way.
    pub fn set_direction(&self, direction: SortDirection) -> bool {
        let active = self.active.lock().expect("active watch mutex poisoned");
        match active.as_ref() {
            Some(w) => w.sync.set_direction(direction),
            None => false,
        }
    }

    pub fn status(&self) -> MirrorStatus {
        let active = self.active.lock().expect("active watch mutex poisoned");
        match active.as_ref() {
            Some(w) => {
                let snap = w.sync.store().snapshot();
                MirrorStatus {
                    channel: Some(w.sync.channel().to_string()),
                    generation: w.generation,
                    items: snap.items.len(),
                    last_seen_id: snap.last_seen_id,
                    direction: snap.direction,
                    initial_loading: snap.initial_loading,
                    last_error: snap.last_error,
                    revision: snap.revision,
                }
            }
            None => MirrorStatus {
                channel: None,
                generation: 0,
                items: 0,
                last_seen_id: None,
                direction: SortDirection::default(),
                initial_loading: false,
                last_error: None,
                revision: 0,
            },
        }
    }
}
