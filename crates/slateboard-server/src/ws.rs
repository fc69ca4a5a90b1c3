//! WebSocket handling: one connection, bound to one room for its lifetime.

use axum::{
    extract::{
        Path, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

use slateboard_core::protocol::Message;

use crate::state::AppState;

/// WebSocket upgrade handler. The room identifier comes from the request
/// path and binds the connection for its whole lifetime.
pub async fn ws_handler(
    Path(room_id): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: String) {
    let conn_id = Uuid::new_v4();
    info!("connection {} bound to room {}", conn_id, room_id);

    let room = state.room(&room_id);
    // Snapshot and subscription are taken as one step under the store
    // lock: frames merged before it are in the snapshot, frames merged
    // after arrive through the channel, never both.
    let (mut rx, snapshot) = room.attach().await;

    let (mut sender, mut receiver) = socket.split();

    // Existing room state is pushed to the new connection only.
    if !snapshot.is_empty() {
        match Message::full_update(snapshot).encode() {
            Ok(frame) => {
                if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                    info!("connection {} closed during snapshot push", conn_id);
                    return;
                }
            }
            Err(e) => error!("room {}: failed to encode snapshot: {}", room_id, e),
        }
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = state
                            .process_frame(&room_id, &room, conn_id, text.as_str())
                            .await;
                        if let Some(reply) = reply {
                            if sender.send(WsMessage::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary ignored
                    Some(Err(e)) => {
                        warn!("connection {}: socket error: {}", conn_id, e);
                        break;
                    }
                }
            }

            relayed = rx.recv() => {
                match relayed {
                    Ok((from, frame)) => {
                        // The sender never receives its own echo.
                        if from != conn_id
                            && sender.send(WsMessage::Text(frame.into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Parity with the room is gone. Drop the
                        // connection; the client's reconnect full push
                        // restores it.
                        warn!(
                            "connection {} lagged, {} frames dropped, closing",
                            conn_id, skipped
                        );
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    // Teardown just unbinds the connection; the room and its store stay.
    info!("connection {} closed", conn_id);
}
