// src/fetch/http.rs
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::fetch::{FeedFetch, FetchError};
use crate::item::{FeedItem, MessagesResponse};

/// HTTP implementation of [`FeedFetch`] against the channel-message API.
///
/// Endpoints:
///   GET <base>/<channel>/latest-messages?limit=<n>
///   GET <base>/<channel>/messages?hours=<n>
pub struct HttpFeedClient {
    base_url: String,
    client: reqwest::Client,
}

/// Per-request timeout. Polls run every few seconds; a fetch that takes
/// longer than this is better failed and retried on the next tick.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpFeedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, channel: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, channel, path)
    }

    async fn get_messages(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        let t0 = std::time::Instant::now();
        let resp = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            counter!("sync_fetch_non_2xx_total").increment(1);
            return Err(FetchError::Status {
                status: status.as_u16(),
                status_text: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            });
        }

        let body = resp.text().await?;
        let envelope: MessagesResponse =
            serde_json::from_str(&body).map_err(FetchError::Decode)?;

        histogram!("sync_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(envelope.messages)
    }
}

#[async_trait]
impl FeedFetch for HttpFeedClient {
    async fn latest_messages(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<FeedItem>, FetchError> {
        let url = format!("{}?limit={limit}", self.url(channel, "latest-messages"));
        self.get_messages(&url).await
    }

    async fn recent_messages(
        &self,
        channel: &str,
        hours: u32,
    ) -> Result<Vec<FeedItem>, FetchError> {
        let url = format!("{}?hours={hours}", self.url(channel, "messages"));
        self.get_messages(&url).await
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}
