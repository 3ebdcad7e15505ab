use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::protocol::{Frame, FrameKind, StunConfigData};
use crate::signaling;
use crate::state::AppState;
use crate::users::UserSession;
use crate::ws::Connection;

/// Ping interval: server sends a WebSocket ping every 30 seconds so
/// abrupt disconnects cannot leak connections.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// If no pong arrives within 10 seconds after a ping, the peer is
/// gone and the stream is closed.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an upgraded WebSocket.
///
/// Splits the socket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Keep-alive task: pings on a timer, watches for pongs
/// - Reader loop: feeds text frames to the signaling engine under a
///   per-frame read deadline
///
/// Any exit path runs the engine's disconnect cleanup, so a dropped
/// stream always leaves its room.
pub async fn run_connection(socket: WebSocket, state: AppState, user: UserSession) {
    let user_id = user.id.clone();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    state.connections.add(Connection::new(&user, tx.clone()));

    // One-shot ICE configuration; the client hands it verbatim to its
    // media engine.
    let mut stun = Frame::new(FrameKind::StunConfig);
    stun.timestamp = chrono::Utc::now().timestamp();
    let stun = stun.with_payload(&StunConfigData {
        ice_servers: state.ice_servers.clone(),
    });
    if !state.connections.send_frame(&user_id, &stun) {
        tracing::error!(user_id = %user_id, "failed to send stun_config");
    }

    // Writer task: the only writer for this socket.
    let write_timeout = state.write_timeout;
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, write_timeout));

    // Keep-alive task: ping, then expect a pong in time.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(Vec::new().into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: any inbound traffic (pongs included) refreshes the
    // read deadline.
    loop {
        let received = match timeout(state.read_timeout, ws_receiver.next()).await {
            Ok(received) => received,
            Err(_) => {
                tracing::warn!(user_id = %user_id, "read timeout, closing connection");
                break;
            }
        };

        match received {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    signaling::handle_message(&state, &user_id, text.as_str()).await;
                    if let Err(e) = state.users.touch(&user_id).await {
                        tracing::warn!(user_id = %user_id, error = %e, "failed to touch user");
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(user_id = %user_id, "ignoring binary frame");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(user_id = %user_id, reason = ?frame, "client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    signaling::handle_disconnect(&state, &user_id).await;
}

/// Writer task: receives messages from the mpsc channel and forwards
/// them to the WebSocket sink under the write deadline.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    write_timeout: Duration,
) {
    while let Some(msg) = rx.recv().await {
        match timeout(write_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }
}
