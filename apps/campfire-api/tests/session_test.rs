mod common;

use serde_json::json;

use campfire_api::config::Config;

/// Sessions short enough to watch end to end.
fn fast_config() -> Config {
    Config {
        port: 0,
        room_capacity: 2,
        session_duration_ms: 900,
        ending_warning_ms: 300,
        kick_threshold: None,
    }
}

/// Bring two fresh connections into a started session.
async fn start_pair(
    addr: std::net::SocketAddr,
) -> (common::WsClient, String, common::WsClient, String) {
    let (mut ws_a, conn_a) = common::connect(addr).await;
    let (mut ws_b, conn_b) = common::connect(addr).await;

    common::join_queue(&mut ws_a).await;
    common::join_queue(&mut ws_b).await;
    common::send_op(&mut ws_a, 3, json!({ "ready": true })).await;
    common::send_op(&mut ws_b, 3, json!({ "ready": true })).await;

    common::recv_dispatch(&mut ws_a, "SESSION_START").await;
    common::recv_dispatch(&mut ws_b, "SESSION_START").await;

    (ws_a, conn_a, ws_b, conn_b)
}

#[tokio::test]
async fn session_fires_warning_then_dissolution_then_forgets_the_room() {
    let addr = common::start_server(fast_config()).await;
    let (mut ws_a, _conn_a, mut ws_b, _conn_b) = start_pair(addr).await;

    let d = common::recv_dispatch(&mut ws_a, "SESSION_ENDING").await;
    assert_eq!(d["remaining"], 300);
    let d = common::recv_dispatch(&mut ws_b, "SESSION_ENDING").await;
    assert_eq!(d["remaining"], 300);

    assert_eq!(
        common::recv_dispatch(&mut ws_a, "SESSION_DISSOLVED").await,
        json!({})
    );
    common::recv_dispatch(&mut ws_b, "SESSION_DISSOLVED").await;

    // The room is gone.
    let client = reqwest::Client::new();
    let rooms: serde_json::Value = client
        .get(format!("http://{addr}/api/v1/rooms"))
        .send()
        .await
        .expect("rooms request")
        .json()
        .await
        .expect("rooms body");
    assert_eq!(rooms.as_array().expect("array").len(), 0);

    // Stale messages referencing the dissolved room are silent no-ops.
    common::send_op(&mut ws_a, 3, json!({ "ready": true })).await;
    common::send_op(&mut ws_a, 1, json!({ "seq": 9 })).await;
    let envelope = common::recv_envelope(&mut ws_a).await;
    assert_eq!(envelope["op"], 6);
}

#[tokio::test]
async fn dissolved_members_can_requeue() {
    let addr = common::start_server(fast_config()).await;
    let (mut ws_a, _conn_a, mut ws_b, _conn_b) = start_pair(addr).await;

    common::recv_dispatch(&mut ws_a, "SESSION_DISSOLVED").await;
    common::recv_dispatch(&mut ws_b, "SESSION_DISSOLVED").await;

    let d = common::join_queue(&mut ws_a).await;
    assert_eq!(d["participants"], 1);
    assert_eq!(d["ready_count"], 0);
}

#[tokio::test]
async fn mid_session_departure_keeps_the_session_running() {
    let addr = common::start_server(fast_config()).await;
    let (mut ws_a, conn_a, mut ws_b, _conn_b) = start_pair(addr).await;

    common::send_op(&mut ws_a, 7, serde_json::Value::Null).await;

    let d = common::recv_dispatch(&mut ws_b, "PARTICIPANT_REMOVED").await;
    assert_eq!(d["peer_id"], conn_a);

    // The remaining member still rides the session out to its deadline.
    common::recv_dispatch(&mut ws_b, "SESSION_ENDING").await;
    common::recv_dispatch(&mut ws_b, "SESSION_DISSOLVED").await;
}

#[tokio::test]
async fn abandoned_session_fires_no_timer_events() {
    let addr = common::start_server(fast_config()).await;
    let (mut ws_a, _conn_a, mut ws_b, conn_b) = start_pair(addr).await;

    common::send_op(&mut ws_a, 7, serde_json::Value::Null).await;
    common::recv_dispatch(&mut ws_b, "PARTICIPANT_REMOVED").await;
    common::send_op(&mut ws_b, 7, serde_json::Value::Null).await;

    // Well past the would-be warning and deadline: nothing arrives.
    common::assert_silent(&mut ws_a, 1200).await;
    common::assert_silent(&mut ws_b, 100).await;

    let client = reqwest::Client::new();
    let rooms: serde_json::Value = client
        .get(format!("http://{addr}/api/v1/rooms"))
        .send()
        .await
        .expect("rooms request")
        .json()
        .await
        .expect("rooms body");
    assert_eq!(rooms.as_array().expect("array").len(), 0);

    // The departed connections are unaffected; conn_b can requeue.
    let d = common::join_queue(&mut ws_b).await;
    assert_eq!(d["participants"], 1);
    assert!(conn_b.starts_with("conn_"));
}

#[tokio::test]
async fn rooms_route_reports_an_active_session_with_remaining_time() {
    let addr = common::start_server(fast_config()).await;
    let (_ws_a, _conn_a, _ws_b, _conn_b) = start_pair(addr).await;

    let client = reqwest::Client::new();
    let rooms: serde_json::Value = client
        .get(format!("http://{addr}/api/v1/rooms"))
        .send()
        .await
        .expect("rooms request")
        .json()
        .await
        .expect("rooms body");
    let rooms = rooms.as_array().expect("array");
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["phase"], "active");
    assert_eq!(rooms[0]["ready_count"], 2);
    let remaining = rooms[0]["remaining_ms"].as_u64().expect("remaining_ms");
    assert!(remaining <= 900);
}
