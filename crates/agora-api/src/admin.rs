//! Admin user management: list users and change roles.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::info;

use agora_db::models::UserRow;
use agora_types::api::{ListUsersResponse, UpdateRoleRequest, UpdateRoleResponse, UserSummary};
use agora_types::models::{Role, User};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

fn summary(row: UserRow) -> Result<UserSummary, ApiError> {
    let role: Role = row.role.parse().map_err(anyhow::Error::from)?;
    Ok(UserSummary {
        id: row.id,
        username: row.username,
        avatar_url: row.avatar_url,
        role,
        created_at: row.created_at,
    })
}

/// `GET /admin/users`: admins first, then ministers, then citizens.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    if !user.role.can_manage_users() {
        return Err(ApiError::Forbidden("admin access required"));
    }

    let st = state.clone();
    let rows = blocking(move || st.db.list_users().map_err(ApiError::from)).await?;

    let users = rows.into_iter().map(summary).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ListUsersResponse { users }))
}

/// `POST /admin/users/{id}/role`: grant citizen or minister. Admin itself
/// is never grantable here, and seed-admin usernames are always forced back
/// to admin no matter what was requested.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UpdateRoleResponse>, ApiError> {
    if !user.role.can_manage_users() {
        return Err(ApiError::Forbidden("admin access required"));
    }
    if user_id <= 0 {
        return Err(ApiError::Validation("invalid user id".to_string()));
    }

    let requested: Role = req
        .role
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation("role must be citizen or minister".to_string()))?;
    if requested == Role::Admin {
        return Err(ApiError::Validation(
            "role must be citizen or minister".to_string(),
        ));
    }

    let now = Utc::now();
    let st = state.clone();
    let updated = blocking(move || {
        let Some(target) = st.db.get_user(user_id)? else {
            return Err(ApiError::NotFound("user"));
        };

        let effective = if st.is_seed_admin(&target.username) {
            Role::Admin
        } else {
            requested
        };

        let Some(row) = st.db.set_user_role(user_id, effective, now)? else {
            return Err(ApiError::NotFound("user"));
        };
        Ok(row)
    })
    .await?;

    let updated = summary(updated)?;
    info!(
        "role of user {} set to {} by {}",
        updated.id,
        updated.role.as_str(),
        user.username
    );

    Ok(Json(UpdateRoleResponse {
        success: true,
        user: updated,
    }))
}
