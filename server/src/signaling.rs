//! The signaling engine.
//!
//! Consumes decoded frames from the per-connection read loops and
//! reconciles the two sources of truth on every operation: shared
//! storage owns membership shape, the local connection registry owns
//! liveness. Engine failures answer the sender with an error frame
//! and never tear down the stream.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::protocol::{ErrorData, Frame, FrameKind, JoinRoomData, UserEventData};
use crate::state::AppState;

/// Process one inbound text frame from `user_id`'s stream.
pub async fn handle_message(state: &AppState, user_id: &str, text: &str) {
    let mut frame = match Frame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "failed to parse frame");
            send_error(state, user_id, 400, "Invalid message format");
            return;
        }
    };

    frame.user_id = Some(user_id.to_string());
    frame.timestamp = now_ts();

    match frame.kind {
        FrameKind::JoinRoom => handle_join_room(state, user_id, &frame).await,
        FrameKind::LeaveRoom => handle_leave_room(state, user_id).await,
        FrameKind::Offer | FrameKind::Answer | FrameKind::IceCandidate => {
            handle_relay(state, user_id, frame).await
        }
        _ => {
            warn!(user_id = %user_id, kind = ?frame.kind, "unhandled message type");
            send_error(state, user_id, 400, "Unknown message type");
        }
    }
}

async fn handle_join_room(state: &AppState, user_id: &str, frame: &Frame) {
    let data: JoinRoomData = match frame.data_as() {
        Ok(data) => data,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "invalid join room payload");
            send_error(state, user_id, 400, "Invalid join room data");
            return;
        }
    };
    let room_id = data.room_id;

    // Switching rooms leaves the old one first, with the full
    // user_left fan-out.
    if let Some(current) = state.connections.room_of(user_id) {
        if current != room_id {
            info!(user_id = %user_id, from = %current, to = %room_id, "switching rooms");
            handle_leave_room(state, user_id).await;
        }
    }

    if let Err(e) = sweep_stale_members(state, &room_id).await {
        error!(room_id = %room_id, error = %e, "failed to sweep stale members");
    }

    match state.rooms.is_full(&room_id).await {
        Ok(false) => {}
        Ok(true) => {
            let mut full = Frame::new(FrameKind::RoomFull);
            full.room_id = Some(room_id.clone());
            full.timestamp = now_ts();
            state.connections.send_frame(user_id, &full);
            return;
        }
        Err(e) => {
            error!(room_id = %room_id, error = %e, "failed to check room status");
            send_error(state, user_id, 500, "Failed to check room status");
            return;
        }
    }

    if let Err(e) = state.rooms.join(user_id, &room_id).await {
        error!(user_id = %user_id, room_id = %room_id, error = %e, "failed to join room");
        send_error(state, user_id, 500, "Failed to join room");
        return;
    }
    state.connections.set_room(user_id, Some(room_id.clone()));
    info!(user_id = %user_id, room_id = %room_id, "user joined room");

    let others = match state.rooms.others(&room_id, user_id).await {
        Ok(others) => others,
        Err(e) => {
            error!(room_id = %room_id, error = %e, "failed to list room peers");
            Vec::new()
        }
    };

    // Peers live on another node are invisible here; they are simply
    // not notified. The joiner still learns everyone reachable.
    let connected: Vec<String> = others
        .into_iter()
        .filter(|id| state.connections.contains(id))
        .collect();
    let mut active = connected.clone();
    active.push(user_id.to_string());

    let mut joined = Frame::new(FrameKind::UserJoined);
    joined.room_id = Some(room_id.clone());
    joined.user_id = Some(user_id.to_string());
    joined.timestamp = now_ts();
    let joined = joined.with_payload(&UserEventData {
        user_id: user_id.to_string(),
        users: active,
    });

    state.connections.fan_out(&connected, &joined);
    // Same frame back to the joiner: the first user_joined a client
    // sees bearing its own id is its identity bootstrap.
    state.connections.send_frame(user_id, &joined);
}

/// Leave the sender's cached room, if any, and notify the remaining
/// members. Also the disconnect path, so the roster is computed from
/// shared state before mutation.
pub(crate) async fn handle_leave_room(state: &AppState, user_id: &str) {
    let Some(room_id) = state.connections.room_of(user_id) else {
        return;
    };

    let others = match state.rooms.others(&room_id, user_id).await {
        Ok(others) => others,
        Err(e) => {
            error!(room_id = %room_id, error = %e, "failed to list room peers");
            Vec::new()
        }
    };

    if let Err(e) = state.rooms.leave(user_id, &room_id).await {
        error!(user_id = %user_id, room_id = %room_id, error = %e, "failed to leave room");
        send_error(state, user_id, 500, "Failed to leave room");
        return;
    }
    state.connections.set_room(user_id, None);
    info!(user_id = %user_id, room_id = %room_id, "user left room");

    if !others.is_empty() {
        let mut left = Frame::new(FrameKind::UserLeft);
        left.room_id = Some(room_id);
        left.user_id = Some(user_id.to_string());
        left.timestamp = now_ts();
        let left = left.with_payload(&UserEventData {
            user_id: user_id.to_string(),
            users: others.clone(),
        });
        state.connections.fan_out(&others, &left);
    }
}

/// Forward an offer, answer, or ICE candidate to its target. The
/// payload is opaque: the engine never parses SDP or ICE, so relayed
/// bytes leave exactly as they arrived.
async fn handle_relay(state: &AppState, user_id: &str, frame: Frame) {
    if state.connections.room_of(user_id).is_none() {
        send_error(state, user_id, 400, "User not in a room");
        return;
    }

    let Some(target_id) = frame.target_id.as_deref().filter(|id| !id.is_empty()) else {
        send_error(state, user_id, 400, "Target user ID required");
        return;
    };

    if !state.connections.send_frame(target_id, &frame) {
        warn!(user_id = %user_id, target_id = %target_id, "relay target not connected");
        send_error(
            state,
            user_id,
            400,
            &format!("target user not connected: {target_id}"),
        );
    }
}

/// Stream-close cleanup: leave the cached room on the user's behalf,
/// then drop the connection record.
pub async fn handle_disconnect(state: &AppState, user_id: &str) {
    if state.connections.room_of(user_id).is_some() {
        handle_leave_room(state, user_id).await;
    }
    state.connections.remove(user_id);
}

/// Evict room members with no connection on this node. Best-effort
/// and local-knowledge-only: a member live on another node gets
/// re-added by its own next activity.
async fn sweep_stale_members(
    state: &AppState,
    room_id: &str,
) -> Result<(), crate::rooms::RoomError> {
    let members = state.rooms.members(room_id).await?;
    let stale: Vec<String> = members
        .into_iter()
        .filter(|id| !state.connections.contains(id))
        .collect();

    for user_id in &stale {
        info!(user_id = %user_id, room_id = %room_id, "removing stale member");
        if let Err(e) = state.rooms.leave(user_id, room_id).await {
            error!(user_id = %user_id, room_id = %room_id, error = %e, "failed to evict stale member");
        }
    }
    if !stale.is_empty() {
        info!(room_id = %room_id, count = stale.len(), "swept stale members");
    }
    Ok(())
}

fn send_error(state: &AppState, user_id: &str, code: u32, message: &str) {
    let mut frame = Frame::new(FrameKind::Error);
    frame.timestamp = now_ts();
    let frame = frame.with_payload(&ErrorData {
        code,
        message: message.to_string(),
    });
    state.connections.send_frame(user_id, &frame);
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}
