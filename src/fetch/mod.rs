// src/fetch/mod.rs
pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::item::FeedItem;

/// Failure of a single feed fetch.
///
/// Non-2xx responses are collapsed into [`FetchError::Status`] without
/// touching the body; a remote that answers 502 with an HTML error page must
/// not surface as a decode failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed endpoint returned {status} {status_text}")]
    Status { status: u16, status_text: String },
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feed response was not a valid message envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A remote, time-ordered, bounded-window source of channel messages.
///
/// Implementations are injected as `Arc<dyn FeedFetch>` so tests can script
/// responses without a network.
#[async_trait]
pub trait FeedFetch: Send + Sync {
    /// The most recent `limit` messages of the channel.
    async fn latest_messages(&self, channel: &str, limit: usize)
        -> Result<Vec<FeedItem>, FetchError>;

    /// Messages from the last `hours` hours. Used for the full initial load.
    async fn recent_messages(&self, channel: &str, hours: u32)
        -> Result<Vec<FeedItem>, FetchError>;

    /// Short label for log attribution.
    fn name(&self) -> &str {
        "feed"
    }
}
