use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::protocol::IceServer;
use crate::rooms::RoomService;
use crate::store::KvStore;
use crate::users::UserRegistry;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Shared KV storage, the only cross-node state
    pub store: Arc<dyn KvStore>,
    /// User identities in shared storage
    pub users: UserRegistry,
    /// Room membership in shared storage
    pub rooms: RoomService,
    /// Live WebSocket connections on this node
    pub connections: ConnectionRegistry,
    /// ICE servers advertised in the stun_config frame
    pub ice_servers: Vec<IceServer>,
    /// Per-frame read deadline
    pub read_timeout: Duration,
    /// Per-frame write deadline
    pub write_timeout: Duration,
    /// Directory served at /
    pub static_dir: String,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>, config: &Config) -> Self {
        let users = UserRegistry::new(store.clone());
        let rooms = RoomService::new(store.clone(), users.clone());
        Self {
            store,
            users,
            rooms,
            connections: ConnectionRegistry::new(),
            ice_servers: config.ice_servers(),
            read_timeout: Duration::from_secs(config.read_timeout),
            write_timeout: Duration::from_secs(config.write_timeout),
            static_dir: config.static_dir.clone(),
        }
    }
}
