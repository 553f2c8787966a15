//! Read-only projection of the notifications written by the message-creation
//! trigger. There is no create or update surface.

use std::sync::Arc;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::error;

use confab_types::api::{Claims, NotificationResponse};

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::{parse_timestamp, parse_uuid};

pub async fn list_notifications(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let user_id = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.db.list_notifications(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;

    let notifications: Vec<NotificationResponse> = rows
        .into_iter()
        .map(|row| NotificationResponse {
            id: parse_uuid(&row.id, "notification"),
            message_id: parse_uuid(&row.message_id, "notification message"),
            is_read: row.is_read,
            created_at: parse_timestamp(&row.created_at, "notification"),
        })
        .collect();

    Ok(Json(notifications))
}
