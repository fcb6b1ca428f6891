// src/item.rs
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of feed content, as served by the channel-message endpoints.
///
/// `id` is issued monotonically by the source and is the stable identity key;
/// everything past `timestamp` is opaque display payload the synchronizer
/// never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(rename = "message_id")]
    pub id: i64,
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "channel_name", default)]
    pub channel: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub forwards: Option<u64>,
    #[serde(default)]
    pub replies: Option<u64>,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(rename = "is_pinned", default)]
    pub pinned: bool,
}

/// Wire envelope returned by both feed endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<FeedItem>,
}

/// Display ordering requested by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    /// Newest first. The default for live views.
    #[default]
    Descending,
}

/// Total order on items for the given direction.
///
/// Items compare by `timestamp`; equal timestamps break by `id` ascending in
/// both directions, so the relative order of same-instant items is stable
/// regardless of the direction toggle.
pub fn feed_order(a: &FeedItem, b: &FeedItem, direction: SortDirection) -> Ordering {
    let by_time = match direction {
        SortDirection::Ascending => a.timestamp.cmp(&b.timestamp),
        SortDirection::Descending => b.timestamp.cmp(&a.timestamp),
    };
    by_time.then(a.id.cmp(&b.id))
}

/// Reduce a channel reference to its bare name.
///
/// Accepts `https://t.me/<name>`, `@<name>`, or a bare `<name>`; returns
/// `None` when nothing is left after stripping.
pub fn normalize_channel(raw: &str) -> Option<String> {
    let mut name = raw.trim();
    if let Some(rest) = name.strip_prefix("https://t.me/") {
        name = rest.rsplit('/').next().unwrap_or(rest);
    }
    name = name.strip_prefix('@').unwrap_or(name);
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
