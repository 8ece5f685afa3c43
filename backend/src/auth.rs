use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use exchange_core::{Role, Session, SessionGate};

use crate::error::ApiError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "sessionId";
const SESSION_HEADER: &str = "x-session-token";

/// Pulls the session token from the bearer header, the custom header, or the cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());
    let custom = || {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    };

    bearer
        .or_else(custom)
        .or_else(|| cookie_value(headers, SESSION_COOKIE))
        .filter(|t| !t.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict")
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

pub(crate) async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, ApiError> {
    let token = session_token(headers);
    let sessions = state.sessions.read().await;
    let session = sessions.authorize(token.as_deref()).map_err(|err| {
        tracing::debug!("rejected request without a valid session");
        err
    })?;
    Ok(session.clone())
}

pub(crate) async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, ApiError> {
    let session = current_session(state, headers).await?;
    SessionGate::require_role(&session, Role::Admin).map_err(|err| {
        tracing::warn!(player = %session.player_id, "admin route refused");
        err
    })?;
    Ok(session)
}
