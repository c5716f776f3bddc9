//! Thutorium Signaling Relay
//!
//! A lightweight WebSocket relay that lets two browser clients on the
//! tutoring marketplace find each other and exchange WebRTC session
//! descriptions:
//!
//! 1. **Presence**: each connection may announce a `userId`; the relay maps it
//!    to the connection's current id (last writer wins).
//!
//! 2. **Signaling**: `callUser`, `answerCall` and `callEnded` envelopes are
//!    forwarded verbatim to the addressed connection. Nothing is queued: a
//!    target that is not present fails immediately with `userNotFound`.
//!
//! 3. **Disconnect notification**: when a connection drops, other clients are
//!    told the call is over (broadcast, or only the call peer).
//!
//! Media never transits the relay.

pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod signaling;
pub mod state;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{DisconnectNotify, RelayConfig, RelayState};

/// Query parameters accepted on the WebSocket upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Build the relay's HTTP router.
pub fn app(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin(&state.config.cors_origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_origin(origin: &str) -> AllowOrigin {
    if origin == "*" {
        return AllowOrigin::from(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            tracing::warn!(origin = origin, error = %e, "Invalid CORS origin, allowing any");
            AllowOrigin::from(Any)
        }
    }
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state, params.user_id))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "thutorium-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "online_connections": state.online_count(),
        "registered_users": state.registered_count(),
        "active_calls": state.active_call_count(),
        "disconnect_notify": state.config.disconnect_notify.as_str(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
