//! The decision registry: an append-only audit log of accepted/rejected
//! outcomes, recorded manually and kept independent of live proposals.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use agora_db::models::RegistryRow;
use agora_types::api::{
    CreateRegistryEntryRequest, CreateRegistryEntryResponse, ListRegistryResponse, ProposalAuthor,
    RegistryEntryResponse,
};
use agora_types::models::{Decision, Role, User};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::validate;

fn entry_response(row: RegistryRow) -> Result<RegistryEntryResponse, ApiError> {
    let decision: Decision = row.decision.parse().map_err(anyhow::Error::from)?;
    let author_role: Role = row.author_role.parse().map_err(anyhow::Error::from)?;

    Ok(RegistryEntryResponse {
        id: row.id,
        title: row.title,
        body: row.body,
        decision,
        reason: row.reason,
        created_at: row.created_at,
        author: ProposalAuthor {
            id: row.author_id,
            username: row.author_name,
            avatar_url: row.author_avatar,
            role: author_role,
        },
    })
}

/// `GET /registry`: the full log, newest first, visible to any
/// authenticated user.
pub async fn list(
    State(state): State<AppState>,
    Extension(_user): Extension<User>,
) -> Result<Json<ListRegistryResponse>, ApiError> {
    let st = state.clone();
    let rows = blocking(move || st.db.list_registry_entries().map_err(ApiError::from)).await?;

    let entries = rows
        .into_iter()
        .map(entry_response)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ListRegistryResponse { entries }))
}

/// `POST /registry`: minister or admin appends a decision.
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateRegistryEntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.role.can_record_decisions() {
        return Err(ApiError::Forbidden(
            "only ministers and admins can record decisions",
        ));
    }

    let title = validate::title(&req.title)?;
    let body = validate::body(&req.body)?;
    let decision: Decision = req
        .decision
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation("decision must be accepted or rejected".to_string()))?;
    let reason = req
        .reason
        .as_deref()
        .map(validate::normalize_single_line)
        .filter(|reason| !reason.is_empty());

    let now = Utc::now();
    let st = state.clone();
    let author_id = user.id;
    let entry_id = blocking(move || {
        st.db
            .insert_registry_entry(author_id, &title, &body, decision, reason.as_deref(), now)
            .map_err(ApiError::from)
    })
    .await?;

    info!("registry entry {entry_id} recorded by {}", user.username);
    Ok((
        StatusCode::CREATED,
        Json(CreateRegistryEntryResponse {
            success: true,
            entry_id,
        }),
    ))
}

/// `DELETE /registry/{id}`: admin only.
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !user.role.can_moderate() {
        return Err(ApiError::Forbidden("admin access required"));
    }
    if id <= 0 {
        return Err(ApiError::Validation("invalid registry entry id".to_string()));
    }

    let st = state.clone();
    let deleted = blocking(move || st.db.delete_registry_entry(id).map_err(ApiError::from)).await?;
    if !deleted {
        return Err(ApiError::NotFound("registry entry"));
    }

    Ok(Json(serde_json::json!({ "success": true, "entry_id": id })))
}
