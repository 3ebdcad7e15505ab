use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use beacon_server::config::{generate_config_template, Config};
use beacon_server::routes;
use beacon_server::state::AppState;
use beacon_server::store::{KvStore, RedisStore};

/// How long in-flight connections get to drain after a termination
/// signal before the process exits anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "beacon_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "beacon_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Beacon signaling server v{} starting", env!("CARGO_PKG_VERSION"));

    // A dead store means a dead fabric, so fail fast
    let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect(&config.redis_url()).await?);
    tracing::info!("Connected to Redis at {}:{}", config.redis_host, config.redis_port);

    let state = AppState::new(store, &config);
    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Translate SIGINT/SIGTERM into a shutdown notification so both
    // the acceptor and the grace timer can watch it.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutting down server...");
        let _ = shutdown_tx.send(true);
    });

    let serve = axum::serve(listener, app).with_graceful_shutdown({
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.changed().await;
        }
    });

    // Open WebSockets keep the graceful drain alive indefinitely, so
    // cap it: once the grace window lapses the process exits and the
    // store (dropped last) closes with it.
    let mut grace_rx = shutdown_rx;
    tokio::select! {
        result = serve => result?,
        _ = async {
            let _ = grace_rx.changed().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!("Forced shutdown after grace period");
        }
    }

    tracing::info!("Server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
