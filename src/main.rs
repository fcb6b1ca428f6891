//! Channel Feed Mirror — Binary Entrypoint
//! Boots the Axum HTTP server and, optionally, an initial watched channel.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use channel_feed_mirror::api::{create_router, AppState};
use channel_feed_mirror::config::SyncConfig;
use channel_feed_mirror::fetch::http::HttpFeedClient;
use channel_feed_mirror::metrics::Metrics;
use channel_feed_mirror::service::FeedMirror;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("channel_feed_mirror=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the variables come from the
    // environment proper.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = SyncConfig::load()?;
    info!(
        base_url = %cfg.base_url,
        interval_secs = cfg.interval_secs,
        latest_limit = cfg.latest_limit,
        window_hours = cfg.window_hours,
        "feed mirror starting"
    );

    let metrics = Metrics::init(cfg.interval_secs);

    let client = Arc::new(HttpFeedClient::new(cfg.base_url.clone()));
    let mirror = Arc::new(FeedMirror::new(client, cfg));

    // Auto-watch a channel at boot when configured; the API can switch later.
    if let Ok(channel) = std::env::var("FEED_CHANNEL") {
        match mirror.watch(&channel).await {
            Ok(name) => info!(channel = %name, "watching configured channel"),
            Err(e) => warn!(channel = %channel, error = %e, "configured channel watch failed"),
        }
    }

    let router = create_router(AppState {
        mirror: Arc::clone(&mirror),
    })
    .merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = format!("0.0.0.0:{port}");
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
