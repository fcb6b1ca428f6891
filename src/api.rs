// src/api.rs
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::item::{FeedItem, SortDirection};
use crate::service::{FeedMirror, MirrorStatus};

#[derive(Clone)]
pub struct AppState {
    pub mirror: Arc<FeedMirror>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/subscribe", post(subscribe))
        .route("/messages", get(messages))
        .route("/sort", post(set_sort))
        .route("/debug/state", get(debug_state))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct SubscribeReq {
    channel: String,
}

#[derive(serde::Serialize)]
struct SubscribeResp {
    success: bool,
    message: String,
}

async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<SubscribeReq>,
) -> Json<SubscribeResp> {
    match state.mirror.watch(&body.channel).await {
        Ok(channel) => Json(SubscribeResp {
            success: true,
            message: format!("Successfully subscribed to {channel}"),
        }),
        // On an initial-load failure the watch stays installed and retries on
        // the poll interval; report the fetch error so the caller can surface
        // it.
        Err(e) => Json(SubscribeResp {
            success: false,
            message: e.to_string(),
        }),
    }
}

#[derive(serde::Serialize)]
struct MessagesResp {
    channel: Option<String>,
    initial_loading: bool,
    last_error: Option<String>,
    messages: Vec<FeedItem>,
}

async fn messages(State(state): State<AppState>) -> Json<MessagesResp> {
    let channel = state.mirror.current_channel();
    match state.mirror.snapshot() {
        Some(snap) => Json(MessagesResp {
            channel,
            initial_loading: snap.initial_loading,
            last_error: snap.last_error,
            messages: snap.items,
        }),
        None => Json(MessagesResp {
            channel,
            initial_loading: false,
            last_error: None,
            messages: Vec::new(),
        }),
    }
}

#[derive(serde::Deserialize)]
struct SortReq {
    direction: SortDirection,
}

#[derive(serde::Serialize)]
struct SortResp {
    direction: SortDirection,
    changed: bool,
}

async fn set_sort(State(state): State<AppState>, Json(body): Json<SortReq>) -> Json<SortResp> {
    let changed = state.mirror.set_direction(body.direction);
    Json(SortResp {
        direction: body.direction,
        changed,
    })
}

async fn debug_state(State(state): State<AppState>) -> Json<MirrorStatus> {
    Json(state.mirror.status())
}
