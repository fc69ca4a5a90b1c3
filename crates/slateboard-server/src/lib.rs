//! Slateboard relay server library.
//!
//! Keeps the authoritative per-room object store, applies the shared
//! revision-gated merge to inbound updates, persists room snapshots, and
//! relays every frame verbatim to the other connections in the room.

pub mod state;
pub mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use state::AppState;

/// Build the relay router over shared state.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/{room}", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> &'static str {
    "Slateboard relay server - connect via WebSocket at /<room-id>"
}

async fn health() -> &'static str {
    "ok"
}
