//! Wire protocol: JSON text frames exchanged with browser clients.
//!
//! Offer/answer/candidate payloads are never parsed; `data` is kept as
//! a raw JSON value so relayed bytes leave exactly as they arrived.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    JoinRoom,
    LeaveRoom,
    Offer,
    Answer,
    IceCandidate,
    UserJoined,
    UserLeft,
    RoomFull,
    StunConfig,
    Error,
    #[serde(other)]
    Unknown,
}

/// A signaling frame. The server stamps `user_id` and `timestamp` on
/// every inbound frame before processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    #[serde(default)]
    pub timestamp: i64,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            room_id: None,
            user_id: None,
            target_id: None,
            data: None,
            timestamp: 0,
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode the `data` field into a typed payload. Clients send it
    /// either as a JSON object or as a JSON string containing JSON;
    /// both forms are accepted.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let raw = self
            .data
            .as_deref()
            .map(RawValue::get)
            .unwrap_or("null");
        match serde_json::from_str::<T>(raw) {
            Ok(value) => Ok(value),
            Err(err) => match serde_json::from_str::<String>(raw) {
                Ok(inner) => serde_json::from_str(&inner),
                Err(_) => Err(err),
            },
        }
    }

    /// Attach a typed payload. Encoding our own payload types cannot
    /// realistically fail; if it ever does the frame goes out without
    /// data, mirroring the best-effort delivery contract.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        match serde_json::to_string(payload).and_then(RawValue::from_string) {
            Ok(raw) => self.data = Some(raw),
            Err(e) => tracing::error!(error = %e, "failed to encode frame payload"),
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomData {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: u32,
    pub message: String,
}

/// Payload for user_joined and user_left roster notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEventData {
    pub user_id: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn urls(urls: Vec<String>) -> Self {
        Self {
            urls,
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunConfigData {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}
