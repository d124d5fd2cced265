//! WebSocket upgrade handler and per-connection event loop.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use campfire_common::id::{prefix, prefixed_ulid};

use crate::AppState;

use super::events::{
    ClientMessage, FlagPayload, GatewayMessage, HeartbeatPayload, ReadyPayload, ServerEvent,
    SignalPayload, OP_FLAG, OP_HEARTBEAT, OP_JOIN_QUEUE, OP_LEAVE_ROOM, OP_READY, OP_SIGNAL,
};

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Heartbeat interval advertised to clients in the WELCOME payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = prefixed_ulid(prefix::CONNECTION);
    let (ws_tx, ws_rx) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel();
    state.registry.register(conn_id.clone(), tx);

    // WELCOME goes through the registry so it carries the first sequence
    // number like every other dispatch.
    state.registry.dispatch(
        &conn_id,
        &ServerEvent::Welcome {
            connection_id: conn_id.clone(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
        },
    );

    tracing::info!(conn_id = %conn_id, "gateway connection established");

    run_connection(&conn_id, &state, ws_tx, ws_rx, rx).await;

    // Transport gone: release everything tied to this connection. Both
    // calls are idempotent, so racing an explicit LEAVE_ROOM is harmless.
    state.registry.unregister(&conn_id);
    state.rooms.leave(&conn_id);

    tracing::info!(conn_id = %conn_id, "gateway connection closed");
}

/// Main connection loop: handle client opcodes, flush queued dispatches,
/// enforce the heartbeat deadline.
async fn run_connection(
    conn_id: &str,
    state: &AppState,
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, Message>,
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    mut outbound: mpsc::UnboundedReceiver<GatewayMessage>,
) {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                break;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload =
                                    serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                                let ack = GatewayMessage::heartbeat_ack(payload.seq);
                                let json = serde_json::to_string(&ack).unwrap();
                                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            OP_JOIN_QUEUE => state.rooms.join_queue(conn_id),
                            OP_READY => match serde_json::from_value::<ReadyPayload>(client_msg.d) {
                                Ok(payload) => state.rooms.set_ready(conn_id, payload.ready),
                                Err(_) => {
                                    let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid READY payload").await;
                                    break;
                                }
                            },
                            OP_FLAG => match serde_json::from_value::<FlagPayload>(client_msg.d) {
                                Ok(payload) => state.rooms.flag(conn_id, &payload.target_id),
                                Err(_) => {
                                    let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid FLAG payload").await;
                                    break;
                                }
                            },
                            OP_SIGNAL => match serde_json::from_value::<SignalPayload>(client_msg.d) {
                                Ok(payload) => state.rooms.signal(conn_id, &payload.to, payload.payload),
                                Err(_) => {
                                    let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid SIGNAL payload").await;
                                    break;
                                }
                            },
                            OP_LEAVE_ROOM => state.rooms.leave(conn_id),
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, conn_id = %conn_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Queued dispatch from the room core or the signal relay.
            queued = outbound.recv() => {
                match queued {
                    Some(msg) => {
                        let json = serde_json::to_string(&msg).unwrap();
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Registry entry was removed out from under us.
                    None => break,
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(conn_id = %conn_id, "heartbeat timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
