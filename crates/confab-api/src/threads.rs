//! HTTP surface for reply-tree reconstruction. The store builds the tree;
//! this layer gates it behind the participation rule and flattens rows into
//! the nested response shape.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use confab_db::thread::MessageTree;
use confab_types::api::{Claims, ThreadNode};

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::{parse_timestamp, parse_uuid, policy};

pub async fn get_thread(
    State(state): State<Arc<AppStateInner>>,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let mid = message_id.to_string();
    let caller = claims.sub.to_string();

    let tree = tokio::task::spawn_blocking(move || {
        let convo = db
            .db
            .get_conversation(&cid)?
            .ok_or_else(|| ApiError::NotFound(format!("conversation {}", cid)))?;
        policy::check_participant(&db.db, &caller, &convo)?;

        let tree = db.db.fetch_thread(&cid, &mid)?;
        Ok::<_, ApiError>(tree)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    Ok(Json(to_node(tree)))
}

fn to_node(tree: MessageTree) -> ThreadNode {
    let row = tree.row;
    ThreadNode {
        id: parse_uuid(&row.id, "thread message"),
        conversation_id: parse_uuid(&row.conversation_id, "thread conversation"),
        sender_id: parse_uuid(&row.sender_id, "thread sender"),
        receiver_id: parse_uuid(&row.receiver_id, "thread receiver"),
        parent_id: row.parent_id.as_deref().map(|p| parse_uuid(p, "thread parent")),
        content: row.content,
        edited: row.edited,
        read: row.read,
        created_at: parse_timestamp(&row.created_at, "thread message"),
        replies: tree.replies.into_iter().map(to_node).collect(),
    }
}
