//! Room membership in shared storage.
//!
//! The room record is authoritative for membership shape; liveness is
//! the connection registry's business. A room exists exactly while it
//! has members: created lazily on first join, deleted when the last
//! member leaves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{KvStore, StoreError};
use crate::users::{UserError, UserRegistry};

/// Hard per-room cap. A soft UX limit, not a safety property: two
/// nodes racing a join may briefly overshoot by one.
pub const MAX_ROOM_USERS: usize = 10;

/// TTL for room records in shared storage.
pub const ROOM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub users: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            users: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_join(&self) -> bool {
        self.users.len() < MAX_ROOM_USERS
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.iter().any(|id| id == user_id)
    }

    /// Add a user, preserving insertion order. Membership is a set.
    pub fn add_user(&mut self, user_id: &str) {
        if !self.contains(user_id) {
            self.users.push(user_id.to_string());
            self.updated_at = Utc::now();
        }
    }

    /// Returns true when the user was actually removed.
    pub fn remove_user(&mut self, user_id: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|id| id != user_id);
        if self.users.len() < before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn others(&self, exclude: &str) -> Vec<String> {
        self.users
            .iter()
            .filter(|id| id.as_str() != exclude)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room is full")]
    Full,
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn KvStore>,
    users: UserRegistry,
}

impl RoomService {
    pub fn new(store: Arc<dyn KvStore>, users: UserRegistry) -> Self {
        Self { store, users }
    }

    fn key(room_id: &str) -> String {
        format!("room:{room_id}")
    }

    pub async fn get(&self, room_id: &str) -> Result<Option<Room>, RoomError> {
        match self.store.get(&Self::key(room_id)).await? {
            Some(raw) => Ok(Some(
                serde_json::from_slice(&raw).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    async fn save(&self, room: &Room) -> Result<(), RoomError> {
        let data = serde_json::to_vec(room).map_err(StoreError::from)?;
        self.store.set_ex(&Self::key(&room.id), data, ROOM_TTL).await?;
        Ok(())
    }

    /// Add the user to the room, creating it on first join, and bind
    /// the user record's current room. Existing members may re-join a
    /// full room; new ones are rejected.
    pub async fn join(&self, user_id: &str, room_id: &str) -> Result<Room, RoomError> {
        let mut room = self
            .get(room_id)
            .await?
            .unwrap_or_else(|| Room::new(room_id));

        if !room.can_join() && !room.contains(user_id) {
            return Err(RoomError::Full);
        }

        room.add_user(user_id);
        self.save(&room).await?;
        self.users.bind_room(user_id, Some(room_id)).await?;
        Ok(room)
    }

    /// Remove the user from the room. Idempotent: an absent room or a
    /// non-member is a silent no-op. Deletes the record when the last
    /// member leaves, then clears the user's current room.
    pub async fn leave(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        if let Some(mut room) = self.get(room_id).await? {
            if room.remove_user(user_id) {
                if room.is_empty() {
                    self.store.del(&Self::key(room_id)).await?;
                } else {
                    self.save(&room).await?;
                }
            }
        }

        // The user record may have hit its TTL (stale-member sweeps
        // evict exactly those ghosts); nothing left to clear then.
        match self.users.bind_room(user_id, None).await {
            Ok(()) => Ok(()),
            Err(UserError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Member ids in insertion order; empty for an absent room.
    pub async fn members(&self, room_id: &str) -> Result<Vec<String>, RoomError> {
        Ok(self
            .get(room_id)
            .await?
            .map(|room| room.users)
            .unwrap_or_default())
    }

    pub async fn others(&self, room_id: &str, exclude: &str) -> Result<Vec<String>, RoomError> {
        Ok(self
            .get(room_id)
            .await?
            .map(|room| room.others(exclude))
            .unwrap_or_default())
    }

    /// An absent room is not full.
    pub async fn is_full(&self, room_id: &str) -> Result<bool, RoomError> {
        Ok(self
            .get(room_id)
            .await?
            .map(|room| !room.can_join())
            .unwrap_or(false))
    }
}
