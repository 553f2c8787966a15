//! Read-only projection of the edit snapshots written by the content-change
//! trigger, scoped to edits the caller made.

use std::sync::Arc;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::error;

use confab_types::api::{Claims, HistoryResponse};

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::{parse_timestamp, parse_uuid};

pub async fn list_history(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let user_id = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.db.list_history_by_editor(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;

    let entries: Vec<HistoryResponse> = rows
        .into_iter()
        .map(|row| HistoryResponse {
            id: parse_uuid(&row.id, "history"),
            message_id: parse_uuid(&row.message_id, "history message"),
            old_content: row.old_content,
            edited_at: parse_timestamp(&row.edited_at, "history"),
        })
        .collect();

    Ok(Json(entries))
}
