pub mod actor;
pub mod handler;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::Frame;
use crate::users::UserSession;

/// Sender half of a connection's outbound channel. The writer task on
/// the other end is the only code that touches the socket, so frames
/// to one peer are always written one at a time.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// A live connection on this node. Never persisted; dies with the
/// stream.
pub struct Connection {
    pub user_id: String,
    pub session_id: String,
    pub sender: ConnectionSender,
    /// The room this connection believes it is in. Authoritative
    /// membership lives in shared storage; this is the local cache the
    /// engine reconciles against.
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Connection {
    pub fn new(user: &UserSession, sender: ConnectionSender) -> Self {
        let now = Utc::now();
        Self {
            user_id: user.id.clone(),
            session_id: user.session_id.clone(),
            sender,
            room_id: None,
            created_at: now,
            last_seen: now,
        }
    }
}

/// Node-local registry of live connections, keyed by user id. Lookups
/// are concurrent; insert/remove/room updates take the shard write
/// lock. Each upgrade mints a fresh user id, so one entry per user.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn: Connection) {
        tracing::info!(user_id = %conn.user_id, "User connected");
        self.inner.insert(conn.user_id.clone(), conn);
    }

    pub fn remove(&self, user_id: &str) {
        if self.inner.remove(user_id).is_some() {
            tracing::info!(user_id = %user_id, "User disconnected");
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The connection's cached room, if any.
    pub fn room_of(&self, user_id: &str) -> Option<String> {
        self.inner
            .get(user_id)
            .and_then(|conn| conn.room_id.clone())
    }

    pub fn set_room(&self, user_id: &str, room_id: Option<String>) {
        if let Some(mut conn) = self.inner.get_mut(user_id) {
            conn.room_id = room_id;
            conn.last_seen = Utc::now();
        }
    }

    /// Serialize and enqueue a frame for one user. Returns false when
    /// the user has no live connection here or the connection is gone.
    pub fn send_frame(&self, user_id: &str, frame: &Frame) -> bool {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize frame");
                return false;
            }
        };
        match self.inner.get(user_id) {
            Some(conn) => conn.sender.send(Message::Text(json.into())).is_ok(),
            None => false,
        }
    }

    /// Best-effort fan-out: recipients without a live connection are
    /// skipped, send failures are logged and do not stop the rest.
    pub fn fan_out(&self, user_ids: &[String], frame: &Frame) {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize frame");
                return;
            }
        };
        let msg = Message::Text(json.into());
        for user_id in user_ids {
            if let Some(conn) = self.inner.get(user_id) {
                if conn.sender.send(msg.clone()).is_err() {
                    tracing::warn!(user_id = %user_id, "failed to send frame, connection closing");
                }
            }
        }
    }
}
