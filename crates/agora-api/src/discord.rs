//! Discord OAuth2 client: authorize URL, code exchange, profile fetch.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use agora_db::queries::OAuthProfile;

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const USER_URL: &str = "https://discord.com/api/users/@me";
const CDN_BASE: &str = "https://cdn.discordapp.com";

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
}

pub fn authorize_url(config: &DiscordConfig, state: &str) -> String {
    let mut url = reqwest::Url::parse(AUTHORIZE_URL).expect("static authorize url");
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "identify")
        .append_pair("state", state)
        .append_pair("prompt", "consent");
    url.into()
}

pub async fn exchange_code(
    http: &reqwest::Client,
    config: &DiscordConfig,
    code: &str,
) -> Result<TokenResponse> {
    let response = http
        .post(TOKEN_URL)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .context("token exchange request failed")?;

    if !response.status().is_success() {
        bail!("token exchange failed with status {}", response.status());
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("token exchange returned a malformed body")?;

    if token.access_token.is_empty() {
        bail!("discord did not return an access token");
    }

    Ok(token)
}

pub async fn fetch_user(http: &reqwest::Client, access_token: &str) -> Result<DiscordUser> {
    let response = http
        .get(USER_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .context("user fetch request failed")?;

    if !response.status().is_success() {
        bail!("user fetch failed with status {}", response.status());
    }

    response
        .json()
        .await
        .context("user fetch returned a malformed body")
}

pub fn profile_from(user: &DiscordUser) -> Result<OAuthProfile> {
    let username = user
        .username
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .or(user.global_name.as_deref())
        .unwrap_or("")
        .trim()
        .to_string();

    if username.is_empty() {
        bail!("discord profile has no username");
    }

    Ok(OAuthProfile {
        discord_id: user.id.clone(),
        username,
        avatar_url: Some(avatar_url(user)),
    })
}

/// Mirror Discord's CDN rules: uploaded avatars by hash (animated ones as
/// gif), legacy discriminator defaults mod 5, new-style defaults derived
/// from the snowflake id.
fn avatar_url(user: &DiscordUser) -> String {
    if let Some(hash) = &user.avatar {
        let ext = if hash.starts_with("a_") { "gif" } else { "png" };
        return format!("{CDN_BASE}/avatars/{}/{hash}.{ext}?size=256", user.id);
    }

    if let Some(disc) = user.discriminator.as_deref().filter(|d| !d.is_empty() && *d != "0")
        && let Ok(number) = disc.parse::<u32>()
    {
        return format!("{CDN_BASE}/embed/avatars/{}.png", number % 5);
    }

    let index = user.id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0);
    format!("{CDN_BASE}/embed/avatars/{index}.png")
}
