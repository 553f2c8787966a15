use rusqlite::Connection;

use crate::models::{ConversationRow, HistoryRow, MessageRow, NewMessage, NotificationRow, UserRow};
use crate::triggers;
use crate::{Database, DbError, Result};

/// Shared column list for message selects. Joins users so the sender's
/// username comes back in a single query (eliminates N+1).
pub(crate) const MESSAGE_COLUMNS: &str =
    "m.id, m.conversation_id, m.sender_id, u.username, m.receiver_id, \
     m.parent_id, m.content, m.edited, m.read, m.created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str, role: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, role) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, role),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Delete a user and run the cleanup cascade.
    ///
    /// The row delete commits first; the cascade then runs post-delete and
    /// is best-effort (failures are logged inside the trigger, not
    /// re-raised — the user row is already gone).
    pub fn delete_user(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let convo_ids = conversation_ids_for_user(conn, id)?;

            let tx = conn.transaction()?;
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(DbError::NotFound(format!("user {}", id)));
            }
            tx.commit()?;

            triggers::user_deleted(conn, id, &convo_ids);
            Ok(())
        })
    }

    // -- Conversations --

    /// Create a conversation with the given members. The creator is always
    /// included, so a conversation can never start empty.
    pub fn create_conversation(
        &self,
        id: &str,
        creator_id: &str,
        participant_ids: &[String],
    ) -> Result<(ConversationRow, Vec<String>)> {
        self.with_conn_mut(|conn| {
            let mut members: Vec<String> = vec![creator_id.to_string()];
            for pid in participant_ids {
                if !members.contains(pid) {
                    members.push(pid.clone());
                }
            }

            let tx = conn.transaction()?;

            for uid in &members {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                    [uid.as_str()],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(DbError::NotFound(format!("user {}", uid)));
                }
            }

            tx.execute("INSERT INTO conversations (id) VALUES (?1)", [id])?;
            for uid in &members {
                tx.execute(
                    "INSERT OR IGNORE INTO participants (conversation_id, user_id) VALUES (?1, ?2)",
                    [id, uid.as_str()],
                )?;
            }

            let row = tx.query_row(
                "SELECT id, created_at FROM conversations WHERE id = ?1",
                [id],
                |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                },
            )?;

            tx.commit()?;
            Ok((row, members))
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, created_at FROM conversations WHERE id = ?1",
                [id],
                |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_participants(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM participants WHERE conversation_id = ?1")?;
            let ids = stmt
                .query_map([conversation_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| participant_exists(conn, conversation_id, user_id))
    }

    pub fn list_conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at
                 FROM conversations c
                 JOIN participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch participant sets for a set of conversation IDs.
    pub fn participants_for_conversations(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<(String, String)>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=conversation_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT conversation_id, user_id FROM participants WHERE conversation_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = conversation_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_conversation(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(DbError::NotFound(format!("conversation {}", id)));
            }
            Ok(())
        })
    }

    // -- Messages --

    /// Insert a message and its receiver notification as one transaction.
    ///
    /// Validations run first: the conversation must exist, sender and
    /// receiver must both be participants, and the parent (if any) must be
    /// a message of the same conversation.
    pub fn create_message(&self, new: NewMessage) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let convo_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
                [new.conversation_id],
                |row| row.get(0),
            )?;
            if !convo_exists {
                return Err(DbError::NotFound(format!(
                    "conversation {}",
                    new.conversation_id
                )));
            }

            if !participant_exists(&tx, new.conversation_id, new.sender_id)? {
                return Err(DbError::Validation(
                    "sender is not a participant of the conversation".into(),
                ));
            }
            if !participant_exists(&tx, new.conversation_id, new.receiver_id)? {
                return Err(DbError::Validation(
                    "receiver is not a participant of the conversation".into(),
                ));
            }

            if let Some(parent_id) = new.parent_id {
                let parent_convo: Option<String> = tx
                    .query_row(
                        "SELECT conversation_id FROM messages WHERE id = ?1",
                        [parent_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match parent_convo {
                    None => {
                        return Err(DbError::Validation("parent message does not exist".into()));
                    }
                    Some(pc) if pc != new.conversation_id => {
                        return Err(DbError::Validation(
                            "parent message belongs to a different conversation".into(),
                        ));
                    }
                    Some(_) => {}
                }
            }

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, parent_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    new.id,
                    new.conversation_id,
                    new.sender_id,
                    new.receiver_id,
                    new.parent_id,
                    new.content,
                    new.created_at,
                ],
            )?;

            let row = query_message(&tx, new.conversation_id, new.id)?
                .ok_or_else(|| DbError::Fatal("inserted message not readable".into()))?;

            triggers::message_created(&tx, &row)?;

            tx.commit()?;
            Ok(row)
        })
    }

    /// Update a message's content, historizing the old content first when it
    /// actually changed. Snapshot and update share one transaction.
    pub fn update_message_content(
        &self,
        conversation_id: &str,
        message_id: &str,
        editor_id: &str,
        new_content: &str,
        edited_at: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let old = query_message(&tx, conversation_id, message_id)?;
            let apply = triggers::message_content_changing(
                &tx,
                old.as_ref(),
                new_content,
                editor_id,
                edited_at,
            )?;

            if old.is_none() {
                return Err(DbError::NotFound(format!("message {}", message_id)));
            }

            if apply {
                tx.execute(
                    "UPDATE messages SET content = ?1, edited = 1 WHERE id = ?2",
                    [new_content, message_id],
                )?;
            }

            let row = query_message(&tx, conversation_id, message_id)?
                .ok_or_else(|| DbError::Fatal("updated message not readable".into()))?;

            tx.commit()?;
            Ok(row)
        })
    }

    /// Flip the read flag. Not a content change, so no history is logged.
    pub fn mark_message_read(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET read = 1 WHERE id = ?1 AND conversation_id = ?2",
                [message_id, conversation_id],
            )?;
            if updated == 0 {
                return Err(DbError::NotFound(format!("message {}", message_id)));
            }
            Ok(())
        })
    }

    pub fn get_message(&self, conversation_id: &str, message_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, conversation_id, message_id))
    }

    pub fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        unread_for: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let base = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.conversation_id = ?1"
            );

            let rows = match unread_for {
                Some(user_id) => {
                    let sql = format!(
                        "{base} AND m.read = 0 AND m.receiver_id = ?2
                         ORDER BY m.created_at DESC LIMIT ?3"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(
                        rusqlite::params![conversation_id, user_id, limit],
                        map_message,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("{base} ORDER BY m.created_at DESC LIMIT ?2");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(rusqlite::params![conversation_id, limit], map_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            Ok(rows)
        })
    }

    pub fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND conversation_id = ?2",
                [message_id, conversation_id],
            )?;
            if deleted == 0 {
                return Err(DbError::NotFound(format!("message {}", message_id)));
            }
            Ok(())
        })
    }

    // -- History / notifications (read-only projections) --

    /// Batch-fetch edit history for a set of message IDs.
    pub fn history_for_messages(&self, message_ids: &[String]) -> Result<Vec<HistoryRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, old_content, edited_by, edited_at
                 FROM message_history WHERE message_id IN ({})
                 ORDER BY edited_at DESC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_history)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_history_by_editor(&self, user_id: &str) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, old_content, edited_by, edited_at
                 FROM message_history WHERE edited_by = ?1
                 ORDER BY edited_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_history)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, message_id, is_read, created_at
                 FROM notifications WHERE user_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        message_id: row.get(2)?,
                        is_read: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is one of two fixed identifiers, never user input.
    let sql = format!(
        "SELECT id, username, password, role, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                role: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_message(
    conn: &Connection,
    conversation_id: &str,
    message_id: &str,
) -> Result<Option<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.id = ?1 AND m.conversation_id = ?2"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([message_id, conversation_id], map_message)
        .optional()?;

    Ok(row)
}

pub(crate) fn map_message(row: &rusqlite::Row) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        receiver_id: row.get(4)?,
        parent_id: row.get(5)?,
        content: row.get(6)?,
        edited: row.get(7)?,
        read: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_history(row: &rusqlite::Row) -> std::result::Result<HistoryRow, rusqlite::Error> {
    Ok(HistoryRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        old_content: row.get(2)?,
        edited_by: row.get(3)?,
        edited_at: row.get(4)?,
    })
}

fn participant_exists(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM participants WHERE conversation_id = ?1 AND user_id = ?2)",
        [conversation_id, user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn conversation_ids_for_user(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT conversation_id FROM participants WHERE user_id = ?1")?;
    let ids = stmt
        .query_map([user_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::DbError;
    use crate::testutil::{add_user, db, make_conversation, new_message, send};

    #[test]
    fn create_message_rejects_unknown_conversation() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let err = db
            .create_message(new_message("no-such-convo", &alice, &bob, None, "hi", "2026-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn create_message_rejects_non_participant_receiver() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let mallory = add_user(&db, "mallory");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let err = db
            .create_message(new_message(&convo, &alice, &mallory, None, "hi", "2026-01-01T00:00:00Z"))
            .unwrap_err();
        match err {
            DbError::Validation(reason) => assert!(reason.contains("receiver")),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn create_message_rejects_parent_from_other_conversation() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo_a = make_conversation(&db, &[&alice, &bob]);
        let convo_b = make_conversation(&db, &[&alice, &bob]);

        let root = send(&db, &convo_a, &alice, &bob, None, "root", "2026-01-01T00:00:00Z");

        let err = db
            .create_message(new_message(&convo_b, &alice, &bob, Some(&root.id), "reply", "2026-01-01T00:00:01Z"))
            .unwrap_err();
        match err {
            DbError::Validation(reason) => assert!(reason.contains("different conversation")),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn failed_message_create_leaves_no_notification() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let mallory = add_user(&db, "mallory");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let _ = db
            .create_message(new_message(&convo, &alice, &mallory, None, "hi", "2026-01-01T00:00:00Z"))
            .unwrap_err();

        assert!(db.list_notifications(&mallory).unwrap().is_empty());
    }

    #[test]
    fn conversation_creator_is_always_a_member() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let (_, members) = db
            .create_conversation("c-1", &alice, &[bob.clone()])
            .unwrap();
        assert_eq!(members.len(), 2);
        assert!(db.is_participant("c-1", &alice).unwrap());
        assert!(db.is_participant("c-1", &bob).unwrap());
    }

    #[test]
    fn create_conversation_rejects_unknown_user() {
        let db = db();
        let alice = add_user(&db, "alice");

        let err = db
            .create_conversation("c-1", &alice, &["ghost".to_string()])
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        // The whole transaction rolled back.
        assert!(db.get_conversation("c-1").unwrap().is_none());
    }

    #[test]
    fn unread_filter_only_returns_unread_for_receiver() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let m1 = send(&db, &convo, &alice, &bob, None, "one", "2026-01-01T00:00:01Z");
        let _m2 = send(&db, &convo, &alice, &bob, None, "two", "2026-01-01T00:00:02Z");
        let _m3 = send(&db, &convo, &bob, &alice, None, "three", "2026-01-01T00:00:03Z");

        db.mark_message_read(&convo, &m1.id).unwrap();

        let unread: Vec<String> = db
            .list_messages(&convo, 50, Some(&bob))
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(unread, vec!["two"]);
    }

    #[test]
    fn delete_message_removes_replies() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let root = send(&db, &convo, &alice, &bob, None, "root", "2026-01-01T00:00:00Z");
        let reply = send(&db, &convo, &bob, &alice, Some(&root.id), "reply", "2026-01-01T00:00:01Z");

        db.delete_message(&convo, &root.id).unwrap();
        assert!(db.get_message(&convo, &reply.id).unwrap().is_none());
    }

    #[test]
    fn delete_missing_entities_reports_not_found() {
        let db = db();
        assert!(matches!(db.delete_conversation("nope"), Err(DbError::NotFound(_))));
        assert!(matches!(db.delete_message("c", "m"), Err(DbError::NotFound(_))));
        assert!(matches!(db.delete_user("u"), Err(DbError::NotFound(_))));
    }
}
