//! # Feed Store
//! Mutex-guarded mirror of one channel feed: an id-keyed item map plus the
//! display state around it (sort direction, high-water mark, error, loading
//! flag).
//!
//! The store is owned by the synchronizer; consumers only ever get owned
//! [`FeedSnapshot`]s and a revision watch for change notification. Nothing
//! outside this module mutates `items` directly.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::item::{feed_order, FeedItem, SortDirection};

/// Counters for one incremental merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Items whose id was not yet in the store.
    pub inserted: usize,
    /// Items whose id was already present and got overwritten in place.
    pub refreshed: usize,
    /// Store size after the merge.
    pub total: usize,
    /// Highest id in the fetched response, if any.
    pub high_water: Option<i64>,
}

/// Owned, read-only view handed to the display layer.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    /// Direction-sorted items.
    pub items: Vec<FeedItem>,
    pub direction: SortDirection,
    pub last_seen_id: Option<i64>,
    pub last_error: Option<String>,
    pub initial_loading: bool,
    pub revision: u64,
}

#[derive(Debug)]
struct Inner {
    items: HashMap<i64, FeedItem>,
    direction: SortDirection,
    last_seen_id: Option<i64>,
    last_error: Option<String>,
    initial_loading: bool,
    loaded: bool,
    revision: u64,
}

#[derive(Debug)]
pub struct FeedStore {
    inner: Mutex<Inner>,
    revision_tx: watch::Sender<u64>,
}

impl FeedStore {
    pub fn new(direction: SortDirection) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                items: HashMap::new(),
                direction,
                last_seen_id: None,
                last_error: None,
                initial_loading: false,
                loaded: false,
                revision: 0,
            }),
            revision_tx,
        }
    }

    /// Subscribe to change notifications. The payload is a revision counter;
    /// receivers re-read via [`FeedStore::snapshot`].
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    fn bump(&self, inner: &mut Inner) {
        inner.revision += 1;
        // send_replace stores the value even with no active receivers, so a
        // late subscriber still observes the current revision.
        self.revision_tx.send_replace(inner.revision);
    }

    /// Raise the user-visible loading flag. Only the initial load does this;
    /// incremental syncs are a background concern.
    pub fn begin_initial_load(&self) {
        let mut inner = self.inner.lock().expect("feed store mutex poisoned");
        inner.initial_loading = true;
        self.bump(&mut inner);
    }

    /// Wholesale replacement after a successful initial fetch. The only
    /// operation that may replace `items`.
    pub fn apply_initial(&self, items: Vec<FeedItem>) -> usize {
        let mut inner = self.inner.lock().expect("feed store mutex poisoned");
        inner.items = items.into_iter().map(|it| (it.id, it)).collect();
        inner.last_seen_id = inner.items.keys().max().copied();
        inner.last_error = None;
        inner.initial_loading = false;
        inner.loaded = true;
        let n = inner.items.len();
        self.bump(&mut inner);
        n
    }

    /// Failed initial fetch: previous state stays untouched, the error is
    /// recorded for display, and the loading flag drops.
    pub fn fail_initial(&self, error: impl std::fmt::Display) {
        let mut inner = self.inner.lock().expect("feed store mutex poisoned");
        inner.last_error = Some(error.to_string());
        inner.initial_loading = false;
        self.bump(&mut inner);
    }

    /// Fold an incremental fetch into the store.
    ///
    /// Dedup is by id-set membership, not by comparison against the high-water
    /// mark: a feed that re-returns an already-seen window, or returns items
    /// out of order, merges to a no-op. Present ids are overwritten in place
    /// (the fetched copy is authoritative, so counters and edit flags
    /// refresh); absent ids are inserted. The high-water mark folds in the
    /// maximum fetched id and never moves backwards.
    pub fn merge(&self, fetched: Vec<FeedItem>) -> MergeStats {
        let mut inner = self.inner.lock().expect("feed store mutex poisoned");

        let high_water = fetched.iter().map(|it| it.id).max();
        let mut inserted = 0usize;
        let mut refreshed = 0usize;
        for it in fetched {
            if inner.items.insert(it.id, it).is_some() {
                refreshed += 1;
            } else {
                inserted += 1;
            }
        }

        inner.last_seen_id = inner.last_seen_id.max(high_water);
        inner.last_error = None;

        let stats = MergeStats {
            inserted,
            refreshed,
            total: inner.items.len(),
            high_water,
        };
        self.bump(&mut inner);
        stats
    }

    /// Record a failed incremental fetch. `items` and the high-water mark are
    /// left exactly as they were.
    pub fn record_sync_error(&self, error: impl std::fmt::Display) {
        let mut inner = self.inner.lock().expect("feed store mutex poisoned");
        inner.last_error = Some(error.to_string());
        self.bump(&mut inner);
    }

    /// Change the display ordering. Returns whether anything changed; never
    /// fetches. The next snapshot re-sorts with the new direction, so a merge
    /// completing after this call still lands in the order current at
    /// snapshot time (last writer wins on direction).
    pub fn set_direction(&self, direction: SortDirection) -> bool {
        let mut inner = self.inner.lock().expect("feed store mutex poisoned");
        if inner.direction == direction {
            return false;
        }
        inner.direction = direction;
        self.bump(&mut inner);
        true
    }

    /// Whether an initial load has ever succeeded for this store.
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().expect("feed store mutex poisoned").loaded
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("feed store mutex poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_seen_id(&self) -> Option<i64> {
        self.inner
            .lock()
            .expect("feed store mutex poisoned")
            .last_seen_id
    }

    /// Owned, direction-sorted view of the store. A full re-sort of the
    /// merged set on every call; the feed window is tens of items, so this
    /// stays cheap and needs no incremental ordering structure.
    pub fn snapshot(&self) -> FeedSnapshot {
        let inner = self.inner.lock().expect("feed store mutex poisoned");
        let direction = inner.direction;
        let mut items: Vec<FeedItem> = inner.items.values().cloned().collect();
        items.sort_by(|a, b| feed_order(a, b, direction));
        FeedSnapshot {
            items,
            direction,
            last_seen_id: inner.last_seen_id,
            last_error: inner.last_error.clone(),
            initial_loading: inner.initial_loading,
            revision: inner.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: i64, secs: i64) -> FeedItem {
        FeedItem {
            id,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            channel: "test".into(),
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

    #[test]
    fn apply_initial_replaces_wholesale_and_sets_high_water() {
        let store = FeedStore::new(SortDirection::Descending);
        store.merge(vec![item(1, 10)]);
        assert_eq!(store.len(), 1);

        let n = store.apply_initial(vec![item(5, 50), item(4, 40), item(3, 30)]);
        assert_eq!(n, 3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.last_seen_id(), Some(5));
        let snap = store.snapshot();
        assert!(snap.items.iter().all(|i| i.id != 1), "old items replaced");
    }

    #[test]
    fn apply_initial_with_empty_feed_clears_high_water() {
        let store = FeedStore::new(SortDirection::Descending);
        store.apply_initial(vec![]);
        assert!(store.is_loaded());
        assert_eq!(store.last_seen_id(), None);
        assert!(store.snapshot().items.is_empty());
    }

    #[test]
    fn merge_inserts_only_unseen_ids() {
        let store = FeedStore::new(SortDirection::Descending);
        store.apply_initial(vec![item(5, 50), item(4, 40), item(3, 30)]);

        let stats = store.merge(vec![item(6, 60), item(5, 50), item(4, 40)]);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.refreshed, 2);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.high_water, Some(6));
        assert_eq!(store.last_seen_id(), Some(6));
    }

    #[test]
    fn merge_refreshes_payload_in_place() {
        let store = FeedStore::new(SortDirection::Descending);
        store.apply_initial(vec![item(1, 10)]);

        let mut updated = item(1, 10);
        updated.views = Some(999);
        updated.edited = true;
        store.merge(vec![updated]);

        let snap = store.snapshot();
        assert_eq!(snap.items.len(), 1);
        assert_eq!(snap.items[0].views, Some(999));
        assert!(snap.items[0].edited);
    }

    #[test]
    fn high_water_never_moves_backwards() {
        let store = FeedStore::new(SortDirection::Descending);
        store.apply_initial(vec![item(8, 80)]);
        store.merge(vec![item(2, 20), item(3, 30)]);
        assert_eq!(store.last_seen_id(), Some(8));
    }

    #[test]
    fn merge_clears_previous_error() {
        let store = FeedStore::new(SortDirection::Descending);
        store.record_sync_error("boom");
        assert!(store.snapshot().last_error.is_some());
        store.merge(vec![item(1, 10)]);
        assert_eq!(store.snapshot().last_error, None);
    }

    #[test]
    fn record_sync_error_leaves_items_and_high_water_untouched() {
        let store = FeedStore::new(SortDirection::Descending);
        store.apply_initial(vec![item(5, 50), item(4, 40)]);
        let before = store.snapshot();

        store.record_sync_error("connection reset");
        let after = store.snapshot();
        assert_eq!(after.items, before.items);
        assert_eq!(after.last_seen_id, before.last_seen_id);
        assert_eq!(after.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn set_direction_reorders_without_refetch() {
        let store = FeedStore::new(SortDirection::Descending);
        store.apply_initial(vec![item(1, 10), item(2, 20), item(3, 30)]);

        let ids: Vec<i64> = store.snapshot().items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        assert!(store.set_direction(SortDirection::Ascending));
        let ids: Vec<i64> = store.snapshot().items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // Idempotent: same direction again is a no-op.
        assert!(!store.set_direction(SortDirection::Ascending));
    }

    #[test]
    fn loading_flag_tracks_initial_load_only() {
        let store = FeedStore::new(SortDirection::Descending);
        assert!(!store.snapshot().initial_loading);

        store.begin_initial_load();
        assert!(store.snapshot().initial_loading);
        store.apply_initial(vec![]);
        assert!(!store.snapshot().initial_loading);

        store.begin_initial_load();
        store.fail_initial("offline");
        let snap = store.snapshot();
        assert!(!snap.initial_loading);
        assert_eq!(snap.last_error.as_deref(), Some("offline"));
    }

    #[test]
    fn revision_bumps_on_every_visible_mutation() {
        let store = FeedStore::new(SortDirection::Descending);
        let rx = store.subscribe();
        let r0 = *rx.borrow();

        store.merge(vec![item(1, 10)]);
        let r1 = *rx.borrow();
        assert!(r1 > r0);

        store.set_direction(SortDirection::Ascending);
        assert!(*rx.borrow() > r1);
    }
}
