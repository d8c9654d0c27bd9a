use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agora_api::auth::{self, AppState, AppStateInner};
use agora_api::discord::DiscordConfig;
use agora_api::middleware::require_auth;
use agora_api::{admin, notifications, proposals, registry};

mod sweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("AGORA_DB_PATH").unwrap_or_else(|_| "agora.db".into());
    let host = std::env::var("AGORA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AGORA_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let sweep_interval: u64 = std::env::var("AGORA_SWEEP_INTERVAL_SECS")
        .unwrap_or_else(|_| "60".into())
        .parse()?;
    let secure_cookies = std::env::var("AGORA_SECURE_COOKIES")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let seed_admins: Vec<String> = std::env::var("AGORA_SEED_ADMINS")
        .unwrap_or_default()
        .split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let discord = DiscordConfig {
        client_id: require_env("DISCORD_CLIENT_ID")?,
        client_secret: require_env("DISCORD_CLIENT_SECRET")?,
        redirect_uri: require_env("DISCORD_REDIRECT_URI")?,
    };

    // Init database (runs migrations)
    let db = agora_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        http: reqwest::Client::new(),
        discord,
        seed_admins,
        secure_cookies,
    });

    // Routes
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/discord", get(auth::discord_redirect))
        .route("/auth/callback", get(auth::discord_callback))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/proposals", get(proposals::list).post(proposals::create))
        .route(
            "/proposals/{id}",
            get(proposals::get_one).delete(proposals::remove),
        )
        .route("/proposals/{id}/vote", post(proposals::cast_vote))
        .route("/registry", get(registry::list).post(registry::create))
        .route("/registry/{id}", delete(registry::remove))
        .route("/notifications", get(notifications::list))
        .route("/notifications/read", post(notifications::mark_read))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/role", post(admin::update_role))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Background settlement sweep, same statement the read path uses
    tokio::spawn(sweep::run_settlement_loop(state.clone(), sweep_interval));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("agora listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{name} must be set"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
