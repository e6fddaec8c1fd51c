// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket subscription to one fan-out room.
//!
//! `GET /ws?room=chat:7:-100123&token=...` streams every event published to
//! the room as JSON:
//! ```json
//! {"room": "chat:7:-100123", "type": "message", "payload": {...}}
//! ```
//! Delivery is best-effort; a slow client skips what it missed.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use courier_bus::{FanoutEvent, is_valid_room};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub room: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Checks the token and room, then upgrades.
pub async fn ws_handler(
    State(state): State<GatewayState>,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.auth.accepts(params.token.as_deref()) {
        return ApiError::Unauthorized.into_response();
    }
    if !is_valid_room(&params.room) {
        return ApiError::bad_request(format!("invalid room: {}", params.room)).into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let events = state.hub.subscribe(&params.room);
    let room = params.room;
    ws.on_upgrade(move |socket| handle_socket(socket, room, events))
}

async fn handle_socket(
    socket: WebSocket,
    room: String,
    mut events: broadcast::Receiver<FanoutEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    tracing::debug!(%room, "websocket subscribed");

    let forward_room = room.clone();
    let sender_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(room = %forward_room, error = %e, "event not serializable");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(room = %forward_room, skipped, "websocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Inbound frames are ignored; the socket is read only to notice a close.
    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    sender_task.abort();
    tracing::debug!(%room, "websocket closed");
}
