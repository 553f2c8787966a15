use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Extension, Json,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use confab_db::models::{HistoryRow, MessageRow, NewMessage};
use confab_types::api::{Claims, EditMessageRequest, HistoryEntry, MessageResponse, SendMessageRequest};

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::client_key;
use crate::{parse_timestamp, parse_uuid, policy};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Only messages addressed to the caller that are still unread.
    #[serde(default)]
    pub unread: bool,
}

fn default_limit() -> u32 {
    50
}

/// Write path for the messaging namespace. The auth and time-window
/// middleware have already run; role, participation, and the rate limiter
/// are applied here, in that order, before the store mutation.
pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    policy::ensure_admin(claims.role)?;

    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("message content must not be empty".into()));
    }

    let message_id = Uuid::new_v4();
    let client = client_key(&headers, peer);

    let db = state.clone();
    let cid = conversation_id.to_string();
    let mid = message_id.to_string();
    let sender = claims.sub.to_string();
    let receiver = req.receiver_id.to_string();
    let parent = req.parent_id.map(|p| p.to_string());

    let row = tokio::task::spawn_blocking(move || {
        let convo = db
            .db
            .get_conversation(&cid)?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", cid)))?;
        policy::check_participant(&db.db, &sender, &convo)?;

        db.limiter
            .allow(&client, Instant::now())
            .map_err(|e| ApiError::RateLimited { retry_after_secs: e.retry_after_secs })?;

        let row = db.db.create_message(NewMessage {
            id: &mid,
            conversation_id: &cid,
            sender_id: &sender,
            receiver_id: &receiver,
            parent_id: parent.as_deref(),
            content: &req.content,
            created_at: &chrono::Utc::now().to_rfc3339(),
        })?;
        Ok::<_, ApiError>(row)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok((StatusCode::CREATED, Json(to_response(row, vec![]))))
}

pub async fn get_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let caller = claims.sub.to_string();
    let limit = query.limit.min(200);
    let unread = query.unread;

    let (rows, history_rows) = tokio::task::spawn_blocking(move || {
        let convo = db
            .db
            .get_conversation(&cid)?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", cid)))?;
        policy::check_participant(&db.db, &caller, &convo)?;

        let rows = db
            .db
            .list_messages(&cid, limit, unread.then_some(caller.as_str()))?;

        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let history_rows = db.db.history_for_messages(&message_ids)?;

        Ok::<_, ApiError>((rows, history_rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    // Group history by message (cheap in-memory work, fine on async thread).
    let mut by_message: HashMap<String, Vec<HistoryRow>> = HashMap::new();
    for h in history_rows {
        by_message.entry(h.message_id.clone()).or_default().push(h);
    }

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| {
            let history = by_message.remove(&row.id).unwrap_or_default();
            to_response(row, history)
        })
        .collect();

    Ok(Json(messages))
}

/// The edit path. A content change historizes the old content inside the
/// store; the authenticated caller is recorded as editor.
pub async fn edit_message(
    State(state): State<Arc<AppStateInner>>,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    policy::ensure_admin(claims.role)?;

    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("message content must not be empty".into()));
    }

    let db = state.clone();
    let cid = conversation_id.to_string();
    let mid = message_id.to_string();
    let editor = claims.sub.to_string();

    let (row, history_rows) = tokio::task::spawn_blocking(move || {
        let current = db
            .db
            .get_message(&cid, &mid)?
            .ok_or_else(|| ApiError::NotFound(format!("message {}", mid)))?;
        policy::check_participant(&db.db, &editor, &current)?;

        let row = db.db.update_message_content(
            &cid,
            &mid,
            &editor,
            &req.content,
            &chrono::Utc::now().to_rfc3339(),
        )?;
        let history_rows = db.db.history_for_messages(&[mid.clone()])?;

        Ok::<_, ApiError>((row, history_rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok(Json(to_response(row, history_rows)))
}

pub async fn delete_message(
    State(state): State<Arc<AppStateInner>>,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    policy::ensure_admin(claims.role)?;

    let db = state.clone();
    let cid = conversation_id.to_string();
    let mid = message_id.to_string();
    let caller = claims.sub.to_string();

    tokio::task::spawn_blocking(move || {
        let current = db
            .db
            .get_message(&cid, &mid)?
            .ok_or_else(|| ApiError::NotFound(format!("message {}", mid)))?;
        policy::check_participant(&db.db, &caller, &current)?;
        db.db.delete_message(&cid, &mid)?;
        Ok::<_, ApiError>(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn to_response(row: MessageRow, history: Vec<HistoryRow>) -> MessageResponse {
    let history = history
        .into_iter()
        .map(|h| HistoryEntry {
            id: parse_uuid(&h.id, "history"),
            old_content: h.old_content,
            edited_by: parse_uuid(&h.edited_by, "history editor"),
            edited_at: parse_timestamp(&h.edited_at, "history"),
        })
        .collect();

    MessageResponse {
        id: parse_uuid(&row.id, "message"),
        conversation_id: parse_uuid(&row.conversation_id, "message conversation"),
        sender_id: parse_uuid(&row.sender_id, "message sender"),
        sender_username: row.sender_username,
        receiver_id: parse_uuid(&row.receiver_id, "message receiver"),
        parent_id: row.parent_id.as_deref().map(|p| parse_uuid(p, "message parent")),
        content: row.content,
        edited: row.edited,
        read: row.read,
        created_at: parse_timestamp(&row.created_at, "message"),
        history,
    }
}
