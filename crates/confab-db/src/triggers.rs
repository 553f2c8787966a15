//! Side effects bound to entity mutations.
//!
//! There is no signal registry: the mutation functions in `queries.rs` call
//! these handlers directly, in a fixed order, so every side effect is visible
//! at the call site. Three hook points exist:
//!
//! 1. `message_created` — after a message INSERT, inside the same
//!    transaction. Writes exactly one notification for the receiver.
//! 2. `message_content_changing` — before a content UPDATE, inside the same
//!    transaction. Snapshots the old content into `message_history` when the
//!    content actually differs.
//! 3. `user_deleted` — after the user row is deleted and committed. Runs the
//!    cleanup cascade outside any wrapping transaction: each statement
//!    commits on its own, a failure partway leaves the earlier steps applied
//!    and is logged rather than re-raised. Callers that need strict
//!    atomicity must widen the delete transaction instead.

use rusqlite::{Connection, Transaction};
use tracing::error;
use uuid::Uuid;

use crate::Result;
use crate::models::MessageRow;

/// Insert the receiver's notification for a freshly created message.
/// Fires only for inserts; updates never reach this hook.
pub(crate) fn message_created(tx: &Transaction, msg: &MessageRow) -> Result<()> {
    tx.execute(
        "INSERT INTO notifications (id, user_id, message_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            msg.receiver_id,
            msg.id,
            msg.created_at,
        ],
    )?;
    Ok(())
}

/// Snapshot the stored content before an edit overwrites it.
///
/// Returns whether the caller should apply the update and mark the message
/// `edited`. `None` for `old` means there is no prior row to diff against,
/// so the hook skips. Changes to fields other than content never reach this
/// hook and therefore never log history.
pub(crate) fn message_content_changing(
    tx: &Transaction,
    old: Option<&MessageRow>,
    new_content: &str,
    editor_id: &str,
    edited_at: &str,
) -> Result<bool> {
    let Some(old) = old else {
        return Ok(false);
    };

    if old.content == new_content {
        return Ok(false);
    }

    tx.execute(
        "INSERT INTO message_history (id, message_id, old_content, edited_by, edited_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            old.id,
            old.content,
            editor_id,
            edited_at,
        ],
    )?;

    Ok(true)
}

/// Cleanup cascade after a user row is gone.
///
/// `conversation_ids` is the membership snapshot taken before the delete —
/// the participant rows themselves may already be gone. Best-effort: the
/// first failing step aborts the rest with only a log line as evidence.
pub(crate) fn user_deleted(conn: &Connection, user_id: &str, conversation_ids: &[String]) {
    if let Err(e) = cascade(conn, user_id, conversation_ids) {
        error!("User cleanup failed for {}: {}", user_id, e);
    }
}

fn cascade(conn: &Connection, user_id: &str, conversation_ids: &[String]) -> Result<()> {
    // The schema's ON DELETE CASCADE already removes rows keyed directly on
    // the user; these deletes are explicit so the invariant does not hinge
    // on DDL details.
    conn.execute(
        "DELETE FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
        [user_id],
    )?;
    conn.execute(
        "DELETE FROM message_history WHERE edited_by = ?1",
        [user_id],
    )?;
    conn.execute("DELETE FROM notifications WHERE user_id = ?1", [user_id])?;
    conn.execute("DELETE FROM participants WHERE user_id = ?1", [user_id])?;

    // A conversation the user belonged to may now be empty; empty
    // conversations must not survive.
    for convo_id in conversation_ids {
        let remaining: i64 = conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE conversation_id = ?1",
            [convo_id],
            |row| row.get(0),
        )?;
        if remaining == 0 {
            conn.execute("DELETE FROM conversations WHERE id = ?1", [convo_id])?;
        }
    }

    Ok(())
}
