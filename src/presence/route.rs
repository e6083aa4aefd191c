/// WebSocket presence route
///
/// A connection authenticates exactly once, at open time, with an access
/// token supplied in the query string; a bad token is rejected before the
/// upgrade and no application data is exchanged. After that the socket is
/// split: a dedicated writer task drains the registry channel while the
/// read loop dispatches client events.
use crate::error::ApiError;
use crate::presence::events::{chat_room, WsInboundEvent, WsOutboundEvent};
use crate::presence::ConnectionId;
use crate::security::jwt::TokenKind;
use crate::state::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Authenticate a connection attempt before any upgrade happens.
///
/// Only a verifiable access token admits a socket; a missing token, a
/// refresh token, or garbage all fail here and the request never upgrades.
fn authenticate(state: &AppState, token: Option<&str>) -> crate::error::Result<(Uuid, String)> {
    let token = token.ok_or(ApiError::InvalidToken)?;
    let claims = state.auth.tokens().verify(token, TokenKind::Access)?;
    let user_id = claims.user_id()?;
    Ok((user_id, claims.device_id))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let (user_id, device_id) = match authenticate(&state, params.token.as_deref()) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, device_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, device_id: String) {
    let (mut ws_sender, mut receiver) = socket.split();

    let (conn_id, mut rx, came_online) = state.presence.register(user_id, &device_id).await;
    info!(user_id = %user_id, device_id = %device_id, "WebSocket connected");

    if came_online {
        let payload = WsOutboundEvent::OnlineStatus {
            user_id,
            is_online: true,
            last_seen: None,
        }
        .to_json();
        state.presence.broadcast_all(&payload).await;
    }

    // Writer task: everything the registry fans out to this connection
    // goes through here. It ends when the registry drops the sender.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(raw) => {
                let event: WsInboundEvent = match serde_json::from_str(&raw) {
                    Ok(event) => event,
                    Err(_) => {
                        let reply = WsOutboundEvent::Error {
                            message: "Invalid event payload".to_string(),
                        }
                        .to_json();
                        state.presence.send_to_connection(conn_id, &reply).await;
                        continue;
                    }
                };
                handle_event(&state, conn_id, user_id, event).await;
            }
            WsMessage::Close(_) => break,
            // Ping/pong handled at the protocol layer
            _ => {}
        }
    }

    if let Some(departure) = state.presence.unregister(conn_id).await {
        debug!(user_id = %departure.user_id, "WebSocket disconnected");

        if departure.went_offline {
            let now = Utc::now();
            state.auth.touch_last_seen(departure.user_id, now).await;

            let payload = WsOutboundEvent::OnlineStatus {
                user_id: departure.user_id,
                is_online: false,
                last_seen: Some(now),
            }
            .to_json();
            state.presence.broadcast_all(&payload).await;
        }
    }

    // Unregister dropped the channel sender, so the writer unwinds on its
    // own; await it to avoid leaking the task handle.
    let _ = writer.await;
}

async fn handle_event(state: &AppState, conn_id: ConnectionId, user_id: Uuid, event: WsInboundEvent) {
    match event {
        WsInboundEvent::JoinChat { chat_id } => {
            state.presence.join_room(conn_id, &chat_room(&chat_id)).await;
        }
        WsInboundEvent::LeaveChat { chat_id } => {
            state.presence.leave_room(conn_id, &chat_room(&chat_id)).await;
        }
        WsInboundEvent::TypingStart { chat_id } => {
            let payload = WsOutboundEvent::TypingStart {
                chat_id: chat_id.clone(),
                user_id,
            }
            .to_json();
            state
                .presence
                .broadcast_room(&chat_room(&chat_id), &payload, Some(conn_id))
                .await;
        }
        WsInboundEvent::TypingStop { chat_id } => {
            let payload = WsOutboundEvent::TypingStop {
                chat_id: chat_id.clone(),
                user_id,
            }
            .to_json();
            state
                .presence
                .broadcast_room(&chat_room(&chat_id), &payload, Some(conn_id))
                .await;
        }
    }
}
