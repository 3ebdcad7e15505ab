//! User identities in shared storage.
//!
//! Every WebSocket upgrade mints a fresh user id, even for a reused
//! session cookie: two tabs of one browser are independent peers. The
//! cookie is an audit trail, not an identity.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::{KvStore, StoreError};

/// Idle TTL for user records in shared storage.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct UserRegistry {
    store: Arc<dyn KvStore>,
}

impl UserRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    async fn save(&self, user: &UserSession) -> Result<(), UserError> {
        let data = serde_json::to_vec(user).map_err(StoreError::from)?;
        self.store.set_ex(&Self::key(&user.id), data, SESSION_TTL).await?;
        Ok(())
    }

    /// Allocate a fresh user id for this session and persist it.
    pub async fn create(&self, session_id: &str) -> Result<UserSession, UserError> {
        let now = Utc::now();
        let user = UserSession {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            room_id: None,
            created_at: now,
            last_seen: now,
        };
        self.save(&user).await?;
        Ok(user)
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserSession>, UserError> {
        match self.store.get(&Self::key(user_id)).await? {
            Some(raw) => Ok(Some(
                serde_json::from_slice(&raw).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Refresh the last-seen timestamp. No-op when the user is absent.
    pub async fn touch(&self, user_id: &str) -> Result<(), UserError> {
        if let Some(mut user) = self.get(user_id).await? {
            user.last_seen = Utc::now();
            self.save(&user).await?;
        }
        Ok(())
    }

    /// Record which room the user currently believes it is in.
    /// `None` means not in any room.
    pub async fn bind_room(&self, user_id: &str, room_id: Option<&str>) -> Result<(), UserError> {
        let mut user = self
            .get(user_id)
            .await?
            .ok_or_else(|| UserError::NotFound(user_id.to_string()))?;
        user.room_id = room_id.map(str::to_string);
        user.last_seen = Utc::now();
        self.save(&user).await
    }

    pub async fn delete(&self, user_id: &str) -> Result<(), UserError> {
        self.store.del(&Self::key(user_id)).await?;
        Ok(())
    }
}
