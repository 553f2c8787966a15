//! Reply-tree reconstruction.
//!
//! Messages form a DAG through `parent_id`; a thread is the subtree under
//! one root message. Reconstruction is structural recursion over direct
//! children, ordered by creation time, all under a single connection lock.

use rusqlite::Connection;

use crate::models::MessageRow;
use crate::queries::{MESSAGE_COLUMNS, map_message, query_message};
use crate::{Database, DbError, Result};

/// Parent links are expected to be acyclic. Corrupted data could still
/// contain a cycle, so recursion stops hard at this depth instead of
/// overflowing the stack.
const MAX_DEPTH: usize = 64;

#[derive(Debug)]
pub struct MessageTree {
    pub row: MessageRow,
    pub replies: Vec<MessageTree>,
}

impl Database {
    /// Materialize the reply tree rooted at `root_id`.
    ///
    /// The root must exist under `conversation_id`; children always share
    /// the conversation because cross-conversation parents are rejected at
    /// write time.
    pub fn fetch_thread(&self, conversation_id: &str, root_id: &str) -> Result<MessageTree> {
        self.with_conn(|conn| {
            let root = query_message(conn, conversation_id, root_id)?
                .ok_or_else(|| DbError::NotFound(format!("message {}", root_id)))?;
            build(conn, root, 0)
        })
    }
}

fn build(conn: &Connection, row: MessageRow, depth: usize) -> Result<MessageTree> {
    if depth >= MAX_DEPTH {
        return Err(DbError::Fatal(format!(
            "reply tree deeper than {} levels under message {}",
            MAX_DEPTH, row.id
        )));
    }

    let children = direct_replies(conn, &row.id)?;
    let mut replies = Vec::with_capacity(children.len());
    for child in children {
        replies.push(build(conn, child, depth + 1)?);
    }

    Ok(MessageTree { row, replies })
}

fn direct_replies(conn: &Connection, parent_id: &str) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.parent_id = ?1
         ORDER BY m.created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map([parent_id], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crate::DbError;
    use crate::testutil::{add_user, db, make_conversation, send};

    #[test]
    fn leaf_message_has_no_replies() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let root = send(&db, &convo, &alice, &bob, None, "root", "2026-01-01T00:00:00Z");

        let tree = db.fetch_thread(&convo, &root.id).unwrap();
        assert_eq!(tree.row.id, root.id);
        assert!(tree.replies.is_empty());
    }

    #[test]
    fn replies_come_back_in_creation_order() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let root = send(&db, &convo, &alice, &bob, None, "root", "2026-01-01T00:00:00Z");
        // Inserted out of order on purpose; ordering must follow timestamps.
        send(&db, &convo, &bob, &alice, Some(&root.id), "second", "2026-01-01T00:00:02Z");
        send(&db, &convo, &bob, &alice, Some(&root.id), "first", "2026-01-01T00:00:01Z");

        let tree = db.fetch_thread(&convo, &root.id).unwrap();
        let contents: Vec<&str> = tree.replies.iter().map(|r| r.row.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn nested_replies_nest_in_the_tree() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo = make_conversation(&db, &[&alice, &bob]);

        let root = send(&db, &convo, &alice, &bob, None, "root", "2026-01-01T00:00:00Z");
        let child = send(&db, &convo, &bob, &alice, Some(&root.id), "child", "2026-01-01T00:00:01Z");
        let grandchild =
            send(&db, &convo, &alice, &bob, Some(&child.id), "grandchild", "2026-01-01T00:00:02Z");

        let tree = db.fetch_thread(&convo, &root.id).unwrap();
        assert_eq!(tree.replies.len(), 1);
        assert_eq!(tree.replies[0].row.id, child.id);
        assert_eq!(tree.replies[0].replies.len(), 1);
        assert_eq!(tree.replies[0].replies[0].row.id, grandchild.id);
        assert!(tree.replies[0].replies[0].replies.is_empty());
    }

    #[test]
    fn thread_root_scoped_to_conversation() {
        let db = db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let convo_a = make_conversation(&db, &[&alice, &bob]);
        let convo_b = make_conversation(&db, &[&alice, &bob]);

        let root = send(&db, &convo_a, &alice, &bob, None, "root", "2026-01-01T00:00:00Z");

        let err = db.fetch_thread(&convo_b, &root.id).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
