//! # Relay Client
//!
//! WebSocket client for connecting to the Thutorium signaling relay.
//!
//! ## Architecture
//!
//! The relay client maintains one WebSocket connection and splits it into:
//!
//! - **Writer task**: serializes outbound [`RelayClientMessage`]s and sends a
//!   keep-alive `ping` on an interval
//! - **Reader task**: parses inbound frames into [`RelayServerMessage`]s
//!
//! Dropping every [`RelaySender`] or losing the socket ends both tasks; the
//! inbound channel then yields `None`, which callers treat as relay loss.
//!
//! Signal payloads are opaque: the relay forwards them verbatim.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::{Error, Result};

/// Opaque session description produced by a peer transport.
pub type SignalData = serde_json::Value;

/// Messages sent from client to relay server.
/// Must match the relay server's `ClientMessage` enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayClientMessage {
    #[serde(rename_all = "camelCase")]
    CallUser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket_id: Option<String>,
        signal_data: SignalData,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        name: String,
    },
    AnswerCall {
        signal: SignalData,
        to: String,
    },
    CallEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },
    Ping,
}

/// Messages received from the relay server.
/// Must match the relay server's `ServerMessage` enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayServerMessage {
    #[serde(rename_all = "camelCase")]
    Me {
        connection_id: String,
    },
    CallUser {
        signal: SignalData,
        from: String,
        #[serde(default)]
        name: String,
    },
    CallAccepted {
        signal: SignalData,
    },
    CallEnded {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        reason: Option<EndReason>,
    },
    #[serde(rename_all = "camelCase")]
    UserNotFound {
        user_id: String,
    },
    Pong,
    Error {
        message: String,
    },
}

/// Why a call ended. Must match the relay server's `EndReason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Hangup,
    Cancelled,
    Rejected,
    Busy,
    Disconnected,
}

/// Relay connection status, once the connection was established.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    Connected,
    /// The relay closed the connection.
    Disconnected,
    /// The connection failed with a transport error.
    Error(String),
}

/// Relay status shared between the reader task and its observers.
pub type SharedRelayStatus = Arc<RwLock<RelayStatus>>;

/// How long to wait for the relay's `me` announcement after the handshake.
const PRESENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloneable handle for sending envelopes to the relay.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<RelayClientMessage>,
}

impl RelaySender {
    /// Queue a message for the relay. Fails once the connection is gone.
    pub fn send(&self, message: RelayClientMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::NotConnected)
    }

    /// Build a sender backed by a plain channel, for tests and in-process
    /// relays.
    pub fn from_channel(tx: mpsc::UnboundedSender<RelayClientMessage>) -> Self {
        Self { tx }
    }
}

/// A live connection to the signaling relay.
pub struct RelayClient {
    connection_id: String,
    sender: RelaySender,
    inbound: mpsc::UnboundedReceiver<RelayServerMessage>,
    status: SharedRelayStatus,
}

impl RelayClient {
    /// Connect to the relay at `url` (e.g. `ws://localhost:5001/ws`),
    /// announcing `user_id` when given, and wait for the relay to assign a
    /// connection id.
    pub async fn connect(
        url: &str,
        user_id: Option<&str>,
        keepalive: Option<Duration>,
    ) -> Result<Self> {
        let url = connect_url(url, user_id);

        tracing::info!(url = url.as_str(), "Connecting to relay");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut ws_sender, mut ws_receiver) = ws.split();

        // ── Presence ─────────────────────────────────────────────────────

        let connection_id =
            match tokio::time::timeout(PRESENCE_TIMEOUT, await_presence(&mut ws_receiver)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Error::ConnectionFailed(
                        "timed out waiting for presence".to_string(),
                    ));
                }
            };

        let status: SharedRelayStatus = Arc::new(RwLock::new(RelayStatus::Connected));
        tracing::info!(connection_id = connection_id.as_str(), "Connected to relay");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RelayClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<RelayServerMessage>();

        // ── Writer Task ──────────────────────────────────────────────────

        tokio::spawn(async move {
            let mut ticker = keepalive.map(tokio::time::interval);
            loop {
                let message = tokio::select! {
                    msg = out_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                    _ = tick(&mut ticker) => RelayClientMessage::Ping,
                };

                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to serialize relay message: {}", e);
                    }
                }
            }
            let _ = ws_sender.close().await;
        });

        // ── Reader Task ──────────────────────────────────────────────────

        let reader_status = status.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<RelayServerMessage>(&text) {
                            Ok(msg) => {
                                if in_tx.send(msg).is_err() {
                                    break; // Receiver dropped
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to parse relay message");
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Relay connection error");
                        *reader_status.write() = RelayStatus::Error(e.to_string());
                        break;
                    }
                }
            }

            let mut status = reader_status.write();
            if *status == RelayStatus::Connected {
                *status = RelayStatus::Disconnected;
            }
            tracing::info!("Relay connection closed");
        });

        Ok(Self {
            connection_id,
            sender: RelaySender { tx: out_tx },
            inbound: in_rx,
            status,
        })
    }

    /// Split into the connection id, the outbound handle, the inbound stream
    /// and the status the reader task keeps current.
    pub fn into_parts(
        self,
    ) -> (
        String,
        RelaySender,
        mpsc::UnboundedReceiver<RelayServerMessage>,
        SharedRelayStatus,
    ) {
        (self.connection_id, self.sender, self.inbound, self.status)
    }
}

/// Read frames until the relay announces our connection id.
async fn await_presence<S>(receiver: &mut S) -> Result<String>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = receiver.next().await {
        if let Message::Text(text) = frame? {
            match serde_json::from_str::<RelayServerMessage>(&text)? {
                RelayServerMessage::Me { connection_id } => return Ok(connection_id),
                RelayServerMessage::Error { message } => {
                    return Err(Error::ConnectionFailed(message));
                }
                other => {
                    tracing::debug!("Ignoring pre-presence message: {:?}", other);
                }
            }
        }
    }

    Err(Error::ConnectionFailed(
        "relay closed before presence announcement".to_string(),
    ))
}

fn connect_url(url: &str, user_id: Option<&str>) -> String {
    match user_id.filter(|id| !id.is_empty()) {
        Some(id) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}userId={}", url, sep, urlencoding::encode(id))
        }
        None => url.to_string(),
    }
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
