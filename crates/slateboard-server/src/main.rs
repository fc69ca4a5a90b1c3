//! Slateboard WebSocket relay server binary.

use slateboard_core::storage::FileStorage;
use slateboard_server::{app, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_DATA_DIR: &str = "rooms";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slateboard_server=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("SLATEBOARD_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .expect("SLATEBOARD_ADDR must be a socket address");
    let data_dir = PathBuf::from(
        std::env::var("SLATEBOARD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
    );

    let storage = FileStorage::new(data_dir.clone()).expect("failed to open snapshot directory");
    let state = Arc::new(AppState::new(Arc::new(storage)));

    let loaded = state.load_rooms().await;
    info!("loaded {} room snapshot(s) from {}", loaded, data_dir.display());

    info!("Slateboard relay server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app(state)).await.unwrap();
}
