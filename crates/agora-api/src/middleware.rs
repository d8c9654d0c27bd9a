use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use agora_types::models::User;

use crate::auth::{AppState, SESSION_COOKIE};
use crate::error::ApiError;

/// Resolve the session token: cookie first, Authorization header as a
/// fallback for non-browser clients.
pub(crate) fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub(crate) async fn lookup_session_user(
    state: &AppState,
    token: String,
) -> Result<Option<User>, ApiError> {
    let st = state.clone();
    let now = Utc::now();
    crate::blocking(move || {
        let row = st.db.session_user(&token, now)?;
        row.map(|row| row.into_user()).transpose().map_err(ApiError::from)
    })
    .await
}

/// Require a live session; the resolved user is inserted as a request
/// extension for the handlers downstream.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(&jar, req.headers()).ok_or(ApiError::Unauthenticated)?;
    let user = lookup_session_user(&state, token)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
