#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use campfire_api::config::Config;
use campfire_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Small, fast rooms for most tests.
pub fn test_config() -> Config {
    Config {
        port: 0,
        room_capacity: 2,
        session_duration_ms: 60_000,
        ending_warning_ms: 10_000,
        kick_threshold: None,
    }
}

/// Helper: start an actual TCP server for WebSocket testing.
/// The server runs in the background.
pub async fn start_server(config: Config) -> SocketAddr {
    let state = AppState::new(config);
    let app = campfire_api::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Helper: connect to the gateway and consume the WELCOME dispatch.
/// Returns the stream and the server-assigned connection ID.
pub async fn connect(addr: SocketAddr) -> (WsClient, String) {
    let url = format!("ws://{addr}/gateway");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let welcome = recv_dispatch(&mut ws, "WELCOME").await;
    let conn_id = welcome["connection_id"]
        .as_str()
        .expect("connection_id present")
        .to_string();
    (ws, conn_id)
}

/// Send one client message `{ op, d }`.
pub async fn send_op(ws: &mut WsClient, op: u8, d: serde_json::Value) {
    let msg = serde_json::json!({ "op": op, "d": d });
    ws.send(tungstenite::Message::Text(msg.to_string().into()))
        .await
        .expect("send");
}

/// Send a raw text frame, bypassing the envelope.
pub async fn send_raw(ws: &mut WsClient, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("send raw");
}

/// Read the next text frame as a JSON envelope, skipping ping/pong.
pub async fn recv_envelope(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse envelope");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

/// Read dispatches until one named `event` arrives; returns its `d`.
/// Dispatches on the way there are discarded.
pub async fn recv_dispatch(ws: &mut WsClient, event: &str) -> serde_json::Value {
    loop {
        let envelope = recv_envelope(ws).await;
        if envelope["op"] == 0 && envelope["t"] == event {
            return envelope["d"].clone();
        }
    }
}

/// Read frames until the server closes; returns the close code, if any.
pub async fn recv_close_code(ws: &mut WsClient) -> Option<u16> {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Close(Some(frame)) => return Some(frame.code.into()),
            tungstenite::Message::Close(None) => return None,
            _ => continue,
        }
    }
}

/// Join the queue and return the first ROOM_UPDATE that confirms it.
pub async fn join_queue(ws: &mut WsClient) -> serde_json::Value {
    send_op(ws, 2, serde_json::Value::Null).await;
    recv_dispatch(ws, "ROOM_UPDATE").await
}

/// Assert that no frame arrives for `ms` milliseconds.
pub async fn assert_silent(ws: &mut WsClient, ms: u64) {
    let result = time::timeout(Duration::from_millis(ms), ws.next()).await;
    assert!(result.is_err(), "expected silence, got: {result:?}");
}
