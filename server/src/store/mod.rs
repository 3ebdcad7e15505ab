//! Shared key-value storage.
//!
//! Room and user records live in a string-to-blob store with per-key
//! TTL so that any node can serve any client. `KvStore` is the seam:
//! `RedisStore` backs production, `MemoryStore` backs tests and
//! single-node runs.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use memory::MemoryStore;
pub use redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A live subscription to a pub/sub channel. Dropping it cancels the
/// underlying pump task.
pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Next payload on the channel, or `None` once the publisher side
    /// is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Typed operations over the shared store. Errors surface unchanged;
/// callers do not retry at this layer.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;
}
