//! Per-user notification inbox. Rows are written by system events
//! (registration, proposal creation); only the read flag ever changes.

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use agora_db::queries::ReadTarget;
use agora_types::api::{
    ListNotificationsResponse, MarkNotificationsReadRequest, MarkNotificationsReadResponse,
    NotificationResponse,
};
use agora_types::models::User;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const DEFAULT_LIMIT: u32 = 30;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

/// `GET /notifications?limit=`: newest first, with the unread count.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let st = state.clone();
    let user_id = user.id;
    let (rows, unread_count) =
        blocking(move || st.db.list_notifications(user_id, limit).map_err(ApiError::from)).await?;

    let notifications = rows
        .into_iter()
        .map(|row| NotificationResponse {
            id: row.id,
            kind: row.kind,
            title: row.title,
            message: row.message,
            href: row.href,
            is_read: row.is_read,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
    }))
}

/// `POST /notifications/read`: mark one notification or the whole inbox.
/// A request naming neither just reports the current unread count.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<MarkNotificationsReadRequest>,
) -> Result<Json<MarkNotificationsReadResponse>, ApiError> {
    let target = if req.all {
        Some(ReadTarget::All)
    } else {
        req.id.filter(|id| *id > 0).map(ReadTarget::One)
    };

    let st = state.clone();
    let user_id = user.id;
    let unread_count = blocking(move || {
        match target {
            Some(target) => st.db.mark_notifications_read(user_id, target),
            None => st.db.unread_count(user_id),
        }
        .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(MarkNotificationsReadResponse {
        success: true,
        unread_count,
    }))
}
