use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::session;
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// Reads (or mints) the session cookie, creates a fresh user identity
/// in shared storage, then upgrades. Failures before registration
/// abort with a plain HTTP status; after the upgrade the actor owns
/// the stream.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let (session_id, minted) = match session::extract_session_id(&headers) {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let user = match state.users.create(&session_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "failed to create user session");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
                .into_response();
        }
    };

    tracing::info!(
        user_id = %user.id,
        session_id = %session_id,
        "upgrading connection"
    );

    let mut response = ws.on_upgrade(move |socket| actor::run_connection(socket, state, user));

    if minted {
        match HeaderValue::from_str(&session::session_cookie(&session_id)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "failed to encode session cookie"),
        }
    }

    response
}
