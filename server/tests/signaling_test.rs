//! End-to-end signaling scenarios over a live server: join echo, peer
//! rosters, capacity, relay, dead targets, and disconnect cleanup.

mod common;

use std::time::Duration;

use serde_json::json;

use common::{start_test_server, TestClient};

#[tokio::test]
async fn join_room_echoes_roster_with_self() {
    let (addr, _state) = start_test_server().await;
    let mut client = TestClient::connect(addr).await;

    client
        .send(&json!({
            "type": "join_room",
            "data": "{\"room_id\":\"R\"}",
        }))
        .await;

    let echo = client.recv().await;
    assert_eq!(echo["type"], "user_joined");
    assert_eq!(echo["room_id"], "R");
    let user_id = echo["user_id"].as_str().unwrap();
    assert!(!user_id.is_empty());
    assert_eq!(echo["data"]["user_id"], user_id);
    assert_eq!(echo["data"]["users"], json!([user_id]));
    assert!(echo["timestamp"].as_i64().unwrap() > 0);

    // Exactly one inbound frame for a solo join.
    client.expect_silence(300).await;
}

#[tokio::test]
async fn second_joiner_is_announced_to_the_first() {
    let (addr, _state) = start_test_server().await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    let (u1, echo1) = c1.join_room("R").await;
    assert_eq!(echo1["data"]["users"], json!([u1]));

    let (u2, echo2) = c2.join_room("R").await;
    assert_eq!(echo2["data"]["users"], json!([u1, u2]));

    // The first client learns about the newcomer, roster included.
    let notice = c1.recv().await;
    assert_eq!(notice["type"], "user_joined");
    assert_eq!(notice["user_id"], u2.as_str());
    assert_eq!(notice["data"]["users"], json!([u1, u2]));

    // Nobody is notified about themselves.
    c2.expect_silence(300).await;
}

#[tokio::test]
async fn eleventh_join_gets_room_full() {
    let (addr, state) = start_test_server().await;

    let mut members = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..10 {
        let mut client = TestClient::connect(addr).await;
        let (user_id, _) = client.join_room("R").await;
        members.push(user_id);
        clients.push(client);
    }

    let mut eleventh = TestClient::connect(addr).await;
    eleventh
        .send(&json!({
            "type": "join_room",
            "data": { "room_id": "R" },
        }))
        .await;

    let frame = eleventh.recv().await;
    assert_eq!(frame["type"], "room_full");
    assert_eq!(frame["room_id"], "R");
    assert!(frame.get("data").is_none());
    eleventh.expect_silence(300).await;

    // No join side effects for the rejected sender.
    let roster = state.rooms.members("R").await.unwrap();
    assert_eq!(roster, members);
}

#[tokio::test]
async fn offer_is_relayed_verbatim() {
    let (addr, _state) = start_test_server().await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    let (u1, _) = c1.join_room("R").await;
    let (u2, _) = c2.join_room("R").await;
    let _ = c1.recv().await; // user_joined about u2

    c1.send(&json!({
        "type": "offer",
        "target_id": u2,
        "data": "{\"sdp\":\"x\",\"type\":\"offer\"}",
    }))
    .await;

    let offer = c2.recv().await;
    assert_eq!(offer["type"], "offer");
    assert_eq!(offer["user_id"], u1.as_str());
    assert_eq!(offer["target_id"], u2.as_str());
    // Payload bytes are untouched by the relay.
    assert_eq!(offer["data"].as_str().unwrap(), r#"{"sdp":"x","type":"offer"}"#);
}

#[tokio::test]
async fn offer_to_disconnected_target_reports_error_and_keeps_stream() {
    let (addr, _state) = start_test_server().await;
    let mut client = TestClient::connect(addr).await;
    client.join_room("R").await;

    client
        .send(&json!({
            "type": "offer",
            "target_id": "ghost",
            "data": { "sdp": "x", "type": "offer" },
        }))
        .await;

    let error = client.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["code"], 400);
    assert!(error["data"]["message"]
        .as_str()
        .unwrap()
        .contains("target user not connected"));

    // The stream survives: a fresh join still round-trips.
    client.send(&json!({ "type": "leave_room" })).await;
    let (_, echo) = client.join_room("R").await;
    assert_eq!(echo["type"], "user_joined");
}

#[tokio::test]
async fn disconnect_removes_user_from_room() {
    let (addr, state) = start_test_server().await;
    let mut client = TestClient::connect(addr).await;
    let (user_id, _) = client.join_room("R").await;
    assert_eq!(state.rooms.members("R").await.unwrap(), vec![user_id]);

    client.close().await;

    // Cleanup runs when the server notices the close.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if state.rooms.members("R").await.unwrap().is_empty() && state.connections.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "room record not cleaned up after disconnect"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(state.rooms.get("R").await.unwrap().is_none());
}

#[tokio::test]
async fn disconnect_notifies_remaining_members() {
    let (addr, _state) = start_test_server().await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    let (u1, _) = c1.join_room("R").await;
    let (u2, _) = c2.join_room("R").await;
    let _ = c1.recv().await; // user_joined about u2

    c1.close().await;

    let left = c2.recv().await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["user_id"], u1.as_str());
    assert_eq!(left["data"]["users"], json!([u2]));
}

#[tokio::test]
async fn leave_notifies_peers_and_is_idempotent() {
    let (addr, state) = start_test_server().await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    let (u1, _) = c1.join_room("R").await;
    let (u2, _) = c2.join_room("R").await;
    let _ = c1.recv().await; // user_joined about u2

    c2.send(&json!({ "type": "leave_room" })).await;

    let left = c1.recv().await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["user_id"], u2.as_str());
    assert_eq!(left["data"]["users"], json!([u1]));
    assert_eq!(state.rooms.members("R").await.unwrap(), vec![u1]);

    // Leaving again, or without ever joining, is a silent no-op.
    c2.send(&json!({ "type": "leave_room" })).await;
    c2.expect_silence(300).await;
    c1.expect_silence(300).await;
}

#[tokio::test]
async fn joining_another_room_leaves_the_first() {
    let (addr, state) = start_test_server().await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    let (u1, _) = c1.join_room("R1").await;
    let (u2, _) = c2.join_room("R1").await;
    let _ = c1.recv().await; // user_joined about u2

    let (_, echo) = c2.join_room("R2").await;
    assert_eq!(echo["room_id"], "R2");
    assert_eq!(echo["data"]["users"], json!([u2]));

    let left = c1.recv().await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["room_id"], "R1");
    assert_eq!(left["user_id"], u2.as_str());

    assert_eq!(state.rooms.members("R1").await.unwrap(), vec![u1]);
    assert_eq!(state.rooms.members("R2").await.unwrap(), vec![u2]);
}

#[tokio::test]
async fn relay_requires_room_and_target() {
    let (addr, _state) = start_test_server().await;
    let mut client = TestClient::connect(addr).await;

    client
        .send(&json!({
            "type": "offer",
            "target_id": "someone",
            "data": { "sdp": "x", "type": "offer" },
        }))
        .await;
    let error = client.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["code"], 400);
    assert_eq!(error["data"]["message"], "User not in a room");

    client.join_room("R").await;
    client
        .send(&json!({
            "type": "ice_candidate",
            "data": { "candidate": "c", "sdpMid": "0", "sdpMLineIndex": 0 },
        }))
        .await;
    let error = client.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["code"], 400);
    assert_eq!(error["data"]["message"], "Target user ID required");
}

#[tokio::test]
async fn malformed_and_unknown_frames_get_400_errors() {
    let (addr, _state) = start_test_server().await;
    let (mut client, _) = TestClient::connect_with_response(addr, None).await;
    let stun = client.recv().await;
    assert_eq!(stun["type"], "stun_config");
    let ice_servers = stun["data"]["iceServers"].as_array().unwrap();
    assert!(!ice_servers.is_empty());
    assert!(ice_servers[0]["urls"][0].as_str().unwrap().starts_with("stun:"));

    client
        .write_raw("this is not json")
        .await;
    let error = client.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["code"], 400);
    assert_eq!(error["data"]["message"], "Invalid message format");

    client.send(&json!({ "type": "subscribe" })).await;
    let error = client.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["code"], 400);
    assert_eq!(error["data"]["message"], "Unknown message type");

    // Neither malformed frame tore down the stream.
    let (_, echo) = client.join_room("R").await;
    assert_eq!(echo["type"], "user_joined");
}
