//! Application state, session issuance, and the Discord OAuth login flow.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::Deserialize;
use tracing::{info, warn};

use agora_db::Database;
use agora_db::queries::NotificationPayload;
use agora_types::api::MeResponse;
use agora_types::models::Role;

use crate::discord::{self, DiscordConfig};
use crate::error::ApiError;
use crate::middleware;

pub const SESSION_COOKIE: &str = "agora_session";
const OAUTH_STATE_COOKIE: &str = "agora_oauth_state";
const SESSION_TTL_DAYS: i64 = 30;
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub http: reqwest::Client,
    pub discord: DiscordConfig,
    /// Usernames (lowercased) always granted the admin role on login and on
    /// role updates: the configurable bootstrap-admin allowlist.
    pub seed_admins: Vec<String>,
    pub secure_cookies: bool,
}

impl AppStateInner {
    pub fn is_seed_admin(&self, username: &str) -> bool {
        let name = username.to_lowercase();
        self.seed_admins.iter().any(|admin| *admin == name)
    }
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn session_cookie(state: &AppStateInner, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(state.secure_cookies)
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// `GET /auth/discord`: start the OAuth flow with a fresh state cookie.
pub async fn discord_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
) -> impl IntoResponse {
    let oauth_state = random_token(16);
    let url = discord::authorize_url(&state.discord, &oauth_state);

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, oauth_state))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(state.secure_cookies)
        .max_age(time::Duration::minutes(OAUTH_STATE_TTL_MINUTES))
        .build();

    (jar.add(cookie), Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// `GET /auth/callback`: complete the flow. Any failure clears the auth
/// cookies and lands on `/?auth=failed` rather than surfacing an error page.
pub async fn discord_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    let jar = jar.remove(removal_cookie(OAUTH_STATE_COOKIE));

    match (query.code.as_deref(), query.state.as_deref(), expected.as_deref()) {
        (Some(code), Some(got), Some(want)) if got == want => {
            match complete_login(&state, code).await {
                Ok(token) => (jar.add(session_cookie(&state, token)), Redirect::to("/")),
                Err(err) => {
                    warn!("discord login failed: {err:#}");
                    (jar.remove(removal_cookie(SESSION_COOKIE)), Redirect::to("/?auth=failed"))
                }
            }
        }
        _ => (jar.remove(removal_cookie(SESSION_COOKIE)), Redirect::to("/?auth=failed")),
    }
}

async fn complete_login(state: &AppState, code: &str) -> anyhow::Result<String> {
    let token = discord::exchange_code(&state.http, &state.discord, code).await?;
    let discord_user = discord::fetch_user(&state.http, &token.access_token).await?;
    let profile = discord::profile_from(&discord_user)?;

    let force_admin = state.is_seed_admin(&profile.username);
    let now = Utc::now();
    let session_token = random_token(32);

    let st = Arc::clone(state);
    let session = session_token.clone();
    let username = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let (user, created) = st.db.upsert_oauth_user(&profile, force_admin, now)?;

        if created {
            let admin_ids = st.db.user_ids_by_roles(&[Role::Admin])?;
            st.db.notify_users(
                &admin_ids,
                &NotificationPayload {
                    kind: "user_registered".to_string(),
                    title: "New registration".to_string(),
                    message: format!("{} signed up through Discord.", user.username),
                    href: Some(format!("/profile?userId={}", user.id)),
                },
                now,
            )?;

            if user.role == Role::Citizen.as_str() {
                st.db.notify_users(
                    &[user.id],
                    &NotificationPayload {
                        kind: "welcome".to_string(),
                        title: "Welcome".to_string(),
                        message: "Welcome to Agora. You can now vote and submit public petitions."
                            .to_string(),
                        href: Some("/".to_string()),
                    },
                    now,
                )?;
            }
        }

        st.db
            .create_session(&session, user.id, now + Duration::days(SESSION_TTL_DAYS), now)?;
        Ok(user.username)
    })
    .await
    .map_err(|err| anyhow::anyhow!("blocking task failed: {err}"))??;

    info!("{username} logged in via discord");
    Ok(session_token)
}

/// `GET /auth/me`: never fails with 401; reports whether a live session is
/// attached and, if so, whose.
pub async fn me(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, ApiError> {
    let user = match middleware::session_token(&jar, &headers) {
        Some(token) => middleware::lookup_session_user(&state, token).await?,
        None => None,
    };

    Ok(Json(MeResponse {
        authenticated: user.is_some(),
        user,
    }))
}

/// `POST /auth/logout`: drop the session row and clear the cookie.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string()) {
        let st = state.clone();
        crate::blocking(move || st.db.delete_session(&token).map_err(ApiError::from)).await?;
    }

    Ok((
        jar.remove(removal_cookie(SESSION_COOKIE)),
        Json(serde_json::json!({ "success": true })),
    ))
}
