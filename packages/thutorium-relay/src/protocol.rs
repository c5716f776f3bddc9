//! Relay protocol message definitions.
//!
//! The relay speaks a small JSON-over-WebSocket protocol, one event per text
//! frame: `{"type": "<event>", ...payload}`. Event and field names are
//! camelCase to match the browser clients.
//!
//! Signal payloads (SDP offers/answers produced by the peer-connection
//! library) are opaque to the relay and forwarded verbatim.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque session description produced by a peer transport.
pub type SignalData = Value;

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from a client to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Place a call. The target is either a registered user id or, in the
    /// no-login variant, the raw connection id another client shared.
    #[serde(rename_all = "camelCase")]
    CallUser {
        #[serde(
            default,
            alias = "userId",
            deserialize_with = "deserialize_optional_ref",
            skip_serializing_if = "Option::is_none"
        )]
        to_user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket_id: Option<String>,
        #[serde(default)]
        signal_data: SignalData,
        /// Caller-claimed identity. Informational only; the relay stamps
        /// the forwarded envelope with the sender's own address.
        #[serde(
            default,
            alias = "fromUserId",
            deserialize_with = "deserialize_optional_ref",
            skip_serializing_if = "Option::is_none"
        )]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Accept an incoming call, sending the answer back to the caller.
    AnswerCall {
        #[serde(default)]
        signal: SignalData,
        #[serde(alias = "toUserId", deserialize_with = "deserialize_ref")]
        to: String,
    },

    /// Hang up, cancel or reject. Without `to` the relay uses the sender's
    /// recorded call peer, if any.
    CallEnded {
        #[serde(
            default,
            deserialize_with = "deserialize_optional_ref",
            skip_serializing_if = "Option::is_none"
        )]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },

    /// Keep-alive.
    Ping,
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Messages sent from the relay server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Presence announcement, sent only to the connecting client.
    #[serde(rename_all = "camelCase")]
    Me { connection_id: String },

    /// An incoming call forwarded from another client.
    CallUser {
        signal: SignalData,
        from: String,
        name: String,
    },

    /// The callee accepted; carries its answer.
    CallAccepted { signal: SignalData },

    /// The counterpart ended the call or disconnected.
    CallEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<EndReason>,
    },

    /// The requested user has no live connection. Sent only to the requester.
    #[serde(rename_all = "camelCase")]
    UserNotFound { user_id: String },

    /// Pong response to keep connection alive.
    Pong,

    /// Error response.
    Error { message: String },
}

// ── Supporting Types ──────────────────────────────────────────────────────────

/// Why a call ended. Forwarded verbatim between clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Hangup,
    Cancelled,
    Rejected,
    Busy,
    Disconnected,
}

/// Clients send user ids either as strings or as bare numbers
/// (`toUserId: Number(id)`); both are normalised to a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRef {
    Text(String),
    Number(i64),
}

impl From<RawRef> for String {
    fn from(raw: RawRef) -> Self {
        match raw {
            RawRef::Text(s) => s,
            RawRef::Number(n) => n.to_string(),
        }
    }
}

fn deserialize_ref<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawRef::deserialize(deserializer).map(String::from)
}

fn deserialize_optional_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawRef>::deserialize(deserializer)?
        .map(String::from)
        .filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_user_from_authenticated_client() {
        let text = r#"{"type":"callUser","fromUserId":7,"toUserId":12,"signalData":{"type":"offer","sdp":"v=0"},"name":"7"}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        match msg {
            ClientMessage::CallUser {
                to_user_id,
                socket_id,
                signal_data,
                from,
                name,
            } => {
                assert_eq!(to_user_id.as_deref(), Some("12"));
                assert!(socket_id.is_none());
                assert_eq!(signal_data["type"], "offer");
                assert_eq!(from.as_deref(), Some("7"));
                assert_eq!(name.as_deref(), Some("7"));
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_call_user_by_socket_id() {
        let text = r#"{"type":"callUser","socketId":"abc-123","signalData":"OFFER1","from":"me","name":"Alice"}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        match msg {
            ClientMessage::CallUser {
                to_user_id,
                socket_id,
                signal_data,
                ..
            } => {
                assert!(to_user_id.is_none());
                assert_eq!(socket_id.as_deref(), Some("abc-123"));
                assert_eq!(signal_data, json!("OFFER1"));
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_answer_call_accepts_to_user_id_alias() {
        let text = r#"{"type":"answerCall","signal":"ANSWER1","toUserId":3}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        match msg {
            ClientMessage::AnswerCall { signal, to } => {
                assert_eq!(signal, json!("ANSWER1"));
                assert_eq!(to, "3");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_call_ended_without_target() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"callEnded"}"#).unwrap();
        match msg {
            ClientMessage::CallEnded { to, reason } => {
                assert!(to.is_none());
                assert!(reason.is_none());
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_call_ended_empty_target_is_none() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"callEnded","to":"","reason":"cancelled"}"#).unwrap();
        match msg {
            ClientMessage::CallEnded { to, reason } => {
                assert!(to.is_none());
                assert_eq!(reason, Some(EndReason::Cancelled));
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_server_message_wire_names() {
        let me = serde_json::to_value(ServerMessage::Me {
            connection_id: "c1".to_string(),
        })
        .unwrap();
        assert_eq!(me, json!({"type": "me", "connectionId": "c1"}));

        let missing = serde_json::to_value(ServerMessage::UserNotFound {
            user_id: "ghost".to_string(),
        })
        .unwrap();
        assert_eq!(missing, json!({"type": "userNotFound", "userId": "ghost"}));

        let accepted = serde_json::to_value(ServerMessage::CallAccepted {
            signal: json!("ANSWER1"),
        })
        .unwrap();
        assert_eq!(accepted, json!({"type": "callAccepted", "signal": "ANSWER1"}));
    }

    #[test]
    fn test_call_ended_skips_empty_fields() {
        let json = serde_json::to_string(&ServerMessage::CallEnded {
            from: None,
            reason: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"callEnded"}"#);
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"joinRoom"}"#).is_err());
    }
}
