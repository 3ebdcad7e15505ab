#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use beacon_server::config::Config;
use beacon_server::routes;
use beacon_server::state::AppState;
use beacon_server::store::{KvStore, MemoryStore};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Start the server on a random port over an in-memory store and
/// return its address plus the state for direct inspection.
pub async fn start_test_server() -> (SocketAddr, AppState) {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let state = AppState::new(store, &Config::default());

    let app = routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// A WebSocket client for driving signaling scenarios.
pub struct TestClient {
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl TestClient {
    /// Connect, optionally presenting a session cookie, and return
    /// the handshake response alongside the client. No frames are
    /// consumed.
    pub async fn connect_with_response(
        addr: SocketAddr,
        cookie: Option<&str>,
    ) -> (Self, Response) {
        let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
        if let Some(cookie) = cookie {
            request
                .headers_mut()
                .insert("Cookie", cookie.parse().unwrap());
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .expect("failed to connect to WebSocket");
        let (write, read) = stream.split();
        (Self { write, read }, response)
    }

    /// Connect and consume the one-shot stun_config frame every
    /// connection receives first.
    pub async fn connect(addr: SocketAddr) -> Self {
        let (mut client, _) = Self::connect_with_response(addr, None).await;
        let stun = client.recv().await;
        assert_eq!(stun["type"], "stun_config", "expected stun_config first");
        client
    }

    pub async fn send(&mut self, frame: &Value) {
        self.write_raw(&frame.to_string()).await;
    }

    /// Send a raw text frame, valid JSON or not.
    pub async fn write_raw(&mut self, text: &str) {
        self.write
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("failed to send frame");
    }

    /// Next JSON text frame; panics after two seconds of silence.
    pub async fn recv(&mut self) -> Value {
        self.recv_within(RECV_TIMEOUT)
            .await
            .expect("timed out waiting for frame")
    }

    /// Next JSON text frame within the given window, or `None`.
    pub async fn recv_within(&mut self, window: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.read.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Some(serde_json::from_str(text.as_str()).expect("invalid frame JSON"));
                }
                // Keep-alive traffic is not part of the scenarios.
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(Some(Ok(_))) | Ok(Some(Err(_))) | Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Assert no frame arrives for the given number of milliseconds.
    pub async fn expect_silence(&mut self, ms: u64) {
        if let Some(frame) = self.recv_within(Duration::from_millis(ms)).await {
            panic!("expected silence, got: {frame}");
        }
    }

    /// Join a room and return the server-assigned user id from the
    /// user_joined echo, plus the echo itself.
    pub async fn join_room(&mut self, room_id: &str) -> (String, Value) {
        self.send(&serde_json::json!({
            "type": "join_room",
            "data": { "room_id": room_id },
        }))
        .await;
        let echo = self.recv().await;
        assert_eq!(echo["type"], "user_joined");
        let user_id = echo["user_id"].as_str().expect("echo carries user_id").to_string();
        (user_id, echo)
    }

    pub async fn close(mut self) {
        let _ = self.write.send(Message::Close(None)).await;
    }
}
