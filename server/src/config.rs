use clap::Parser;
use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::protocol::IceServer;

/// Beacon signaling server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "beacon-server", version, about = "Beacon WebRTC signaling server")]
pub struct Config {
    /// Bind address
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    /// Per-frame read deadline in seconds
    #[arg(long, env = "READ_TIMEOUT", default_value = "60")]
    pub read_timeout: u64,

    /// Per-frame write deadline in seconds
    #[arg(long, env = "WRITE_TIMEOUT", default_value = "60")]
    pub write_timeout: u64,

    /// Redis host
    #[arg(long, env = "REDIS_HOST", default_value = "localhost")]
    pub redis_host: String,

    /// Redis port
    #[arg(long, env = "REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    /// Redis password (empty for none)
    #[arg(long, env = "REDIS_PASSWORD", default_value = "")]
    pub redis_password: String,

    /// Redis logical database
    #[arg(long, env = "REDIS_DB", default_value = "0")]
    pub redis_db: i64,

    /// STUN server URL advertised to clients
    #[arg(long, env = "STUN_URL", default_value = "stun:localhost:3478")]
    pub stun_url: String,

    /// TURN server URL advertised to clients
    #[arg(long, env = "TURN_URL", default_value = "turn:localhost:3478")]
    pub turn_url: String,

    /// Directory served at / (browser test front-end)
    #[arg(long, env = "STATIC_DIR", default_value = "./web/static")]
    pub static_dir: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./beacon.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "BEACON_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout: 60,
            write_timeout: 60,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: String::new(),
            redis_db: 0,
            stun_url: "stun:localhost:3478".to_string(),
            turn_url: "turn:localhost:3478".to_string(),
            static_dir: "./web/static".to_string(),
            config: "./beacon.toml".to_string(),
            json_logs: false,
            generate_config: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars / CLI args (clap resolves both)
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    /// Redis connection URL assembled from the individual settings.
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis_password, self.redis_host, self.redis_port, self.redis_db
            )
        }
    }

    /// ICE server list advertised to clients in the stun_config frame.
    pub fn ice_servers(&self) -> Vec<IceServer> {
        vec![
            IceServer::urls(vec![self.stun_url.clone()]),
            IceServer::urls(vec![self.turn_url.clone()]),
        ]
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Beacon Signaling Server Configuration
# Place this file at ./beacon.toml or specify with --config <path>
# All settings can be overridden via environment variables (SERVER_PORT, etc.)
# or CLI flags (--port, etc.)

# Bind address (default: 0.0.0.0 — all interfaces)
# host = "0.0.0.0"

# Server port (default: 8080)
# port = 8080

# WebSocket read/write deadlines in seconds
# read_timeout = 60
# write_timeout = 60

# Redis connection
# redis_host = "localhost"
# redis_port = 6379
# redis_password = ""
# redis_db = 0

# STUN/TURN URLs advertised to clients (the fabric never proxies media)
# stun_url = "stun:localhost:3478"
# turn_url = "turn:localhost:3478"

# Directory served at / (browser test front-end)
# static_dir = "./web/static"

# Enable structured JSON logging for Docker/production
# json_logs = false
"#
    .to_string()
}
