//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: parsing client messages,
//! routing them through the signaling relay, and writing responses.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::signaling;
use crate::state::RelayState;

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Registers the connection (and its `userId`, when given)
/// 2. Spawns a sender task to forward outbound messages
/// 3. Processes incoming messages until the connection closes
/// 4. Unregisters and notifies on disconnect
pub async fn handle_websocket(socket: WebSocket, state: RelayState, user_id: Option<String>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let user_id = user_id.filter(|id| !id.is_empty());

    if state.config.require_user_id && user_id.is_none() {
        tracing::warn!("Rejecting connection without userId");
        let err = ServerMessage::Error {
            message: "userId is required".to_string(),
        };
        if let Ok(json) = serde_json::to_string(&err) {
            let _ = ws_sender.send(Message::Text(json)).await;
        }
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    }

    // ── Step 1: Register Connection ───────────────────────────────────────

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection_id = signaling::on_connect(&state, user_id.as_deref(), tx);

    // ── Step 2: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
    });

    // ── Step 3: Process Messages ──────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    signaling::handle_client_message(&state, &connection_id, client_msg);
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = connection_id.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    let _ = state.send_to_connection(
                        &connection_id,
                        ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(
                    connection_id = connection_id.as_str(),
                    "Client sent close frame"
                );
                break;
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = connection_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong: protocol-level frames are answered by axum
        }
    }

    // ── Step 4: Cleanup ───────────────────────────────────────────────────

    signaling::on_disconnect(&state, &connection_id);
    sender_task.abort();
    tracing::info!(
        connection_id = connection_id.as_str(),
        "WebSocket disconnected"
    );
}
