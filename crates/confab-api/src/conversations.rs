use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use confab_types::api::{Claims, ConversationResponse, CreateConversationRequest};

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::policy;
use crate::{parse_timestamp, parse_uuid};

pub async fn create_conversation(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = Uuid::new_v4();

    let db = state.clone();
    let cid = id.to_string();
    let creator = claims.sub.to_string();
    let participant_ids: Vec<String> = req.participant_ids.iter().map(|p| p.to_string()).collect();

    let (row, members) = tokio::task::spawn_blocking(move || {
        db.db.create_conversation(&cid, &creator, &participant_ids)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse {
            id,
            participants: members.iter().map(|m| parse_uuid(m, "participant")).collect(),
            created_at: parse_timestamp(&row.created_at, "conversation"),
        }),
    ))
}

pub async fn list_conversations(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let user_id = claims.sub.to_string();

    let (rows, participant_rows) = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_conversations_for_user(&user_id)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let participant_rows = db.db.participants_for_conversations(&ids)?;
        Ok::<_, ApiError>((rows, participant_rows))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    // Group participants by conversation (cheap in-memory work).
    let mut by_conversation: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (conversation_id, user_id) in &participant_rows {
        by_conversation
            .entry(conversation_id.clone())
            .or_default()
            .push(parse_uuid(user_id, "participant"));
    }

    let conversations: Vec<ConversationResponse> = rows
        .into_iter()
        .map(|row| ConversationResponse {
            id: parse_uuid(&row.id, "conversation"),
            participants: by_conversation.remove(&row.id).unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at, "conversation"),
        })
        .collect();

    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let caller = claims.sub.to_string();

    let (row, participants) = tokio::task::spawn_blocking(move || {
        let row = db
            .db
            .get_conversation(&cid)?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", cid)))?;
        policy::check_participant(&db.db, &caller, &row)?;
        let participants = db.db.get_participants(&row.id)?;
        Ok::<_, ApiError>((row, participants))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok(Json(ConversationResponse {
        id: conversation_id,
        participants: participants.iter().map(|p| parse_uuid(p, "participant")).collect(),
        created_at: parse_timestamp(&row.created_at, "conversation"),
    }))
}

pub async fn delete_conversation(
    State(state): State<Arc<AppStateInner>>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let caller = claims.sub.to_string();

    tokio::task::spawn_blocking(move || {
        let row = db
            .db
            .get_conversation(&cid)?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", cid)))?;
        policy::check_participant(&db.db, &caller, &row)?;
        db.db.delete_conversation(&cid)?;
        Ok::<_, ApiError>(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok(StatusCode::NO_CONTENT)
}
