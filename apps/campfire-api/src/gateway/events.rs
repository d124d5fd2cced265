//! Gateway opcodes, event types, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_JOIN_QUEUE: u8 = 2;
pub const OP_READY: u8 = 3;
pub const OP_FLAG: u8 = 4;
pub const OP_SIGNAL: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_LEAVE_ROOM: u8 = 7;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

// ---------------------------------------------------------------------------
// Client payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReadyPayload {
    pub ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct FlagPayload {
    pub target_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SignalPayload {
    pub to: String,
    /// Opaque negotiation payload. Never inspected, never stored.
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const WELCOME: &'static str = "WELCOME";
    pub const ROOM_UPDATE: &'static str = "ROOM_UPDATE";
    pub const SESSION_START: &'static str = "SESSION_START";
    pub const SESSION_ENDING: &'static str = "SESSION_ENDING";
    pub const SESSION_DISSOLVED: &'static str = "SESSION_DISSOLVED";
    pub const PARTICIPANT_REMOVED: &'static str = "PARTICIPANT_REMOVED";
    pub const SIGNAL: &'static str = "SIGNAL";
}

/// A typed outbound event, independent of the wire envelope that carries it.
///
/// The room core produces these; the registry wraps them into dispatch
/// messages with a per-connection sequence number at send time.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Welcome {
        connection_id: String,
        heartbeat_interval_ms: u64,
    },
    RoomUpdate {
        participants: usize,
        ready_count: usize,
    },
    SessionStart {
        room_id: String,
        peers: Vec<String>,
        duration_ms: u64,
    },
    SessionEnding {
        remaining_ms: u64,
    },
    SessionDissolved,
    ParticipantRemoved {
        peer_id: String,
        new_peers: Vec<String>,
    },
    Signal {
        from: String,
        payload: Value,
    },
}

impl ServerEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => EventName::WELCOME,
            ServerEvent::RoomUpdate { .. } => EventName::ROOM_UPDATE,
            ServerEvent::SessionStart { .. } => EventName::SESSION_START,
            ServerEvent::SessionEnding { .. } => EventName::SESSION_ENDING,
            ServerEvent::SessionDissolved => EventName::SESSION_DISSOLVED,
            ServerEvent::ParticipantRemoved { .. } => EventName::PARTICIPANT_REMOVED,
            ServerEvent::Signal { .. } => EventName::SIGNAL,
        }
    }

    /// The `d` payload of the dispatch message.
    pub fn data(&self) -> Value {
        match self {
            ServerEvent::Welcome {
                connection_id,
                heartbeat_interval_ms,
            } => json!({
                "connection_id": connection_id,
                "heartbeat_interval": heartbeat_interval_ms,
            }),
            ServerEvent::RoomUpdate {
                participants,
                ready_count,
            } => json!({
                "participants": participants,
                "ready_count": ready_count,
            }),
            ServerEvent::SessionStart {
                room_id,
                peers,
                duration_ms,
            } => json!({
                "room_id": room_id,
                "peers": peers,
                "duration": duration_ms,
            }),
            ServerEvent::SessionEnding { remaining_ms } => json!({
                "remaining": remaining_ms,
            }),
            ServerEvent::SessionDissolved => json!({}),
            ServerEvent::ParticipantRemoved { peer_id, new_peers } => json!({
                "peer_id": peer_id,
                "new_peers": new_peers,
            }),
            ServerEvent::Signal { from, payload } => json!({
                "from": from,
                "payload": payload,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_envelope_shape() {
        let msg = GatewayMessage::dispatch(EventName::ROOM_UPDATE, 3, json!({ "participants": 1 }));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["op"], 0);
        assert_eq!(value["t"], "ROOM_UPDATE");
        assert_eq!(value["s"], 3);
        assert_eq!(value["d"]["participants"], 1);
    }

    #[test]
    fn heartbeat_ack_omits_event_fields() {
        let msg = GatewayMessage::heartbeat_ack(7);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["op"], 6);
        assert_eq!(value["d"]["ack"], 7);
        assert!(value.get("t").is_none());
        assert!(value.get("s").is_none());
    }

    #[test]
    fn session_start_payload_keys() {
        let event = ServerEvent::SessionStart {
            room_id: "room_x".to_string(),
            peers: vec!["conn_a".to_string(), "conn_b".to_string()],
            duration_ms: 900_000,
        };
        assert_eq!(event.event_name(), "SESSION_START");
        let d = event.data();
        assert_eq!(d["room_id"], "room_x");
        assert_eq!(d["peers"][0], "conn_a");
        assert_eq!(d["duration"], 900_000);
    }

    #[test]
    fn dissolved_payload_is_empty_object() {
        assert_eq!(ServerEvent::SessionDissolved.data(), json!({}));
    }

    #[test]
    fn signal_payload_is_forwarded_untouched() {
        let payload = json!({ "sdp": "v=0...", "candidates": [1, 2, 3] });
        let event = ServerEvent::Signal {
            from: "conn_a".to_string(),
            payload: payload.clone(),
        };
        assert_eq!(event.data()["payload"], payload);
    }

    #[test]
    fn client_message_tolerates_missing_payload() {
        let msg: ClientMessage = serde_json::from_str(r#"{ "op": 2 }"#).unwrap();
        assert_eq!(msg.op, OP_JOIN_QUEUE);
        assert!(msg.d.is_null());
    }

    #[test]
    fn ready_payload_parses() {
        let payload: ReadyPayload = serde_json::from_value(json!({ "ready": true })).unwrap();
        assert!(payload.ready);
    }
}
