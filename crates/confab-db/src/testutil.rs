//! Shared helpers for the crate's unit tests.

use uuid::Uuid;

use crate::Database;
use crate::models::{MessageRow, NewMessage};

pub(crate) fn db() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

pub(crate) fn add_user(db: &Database, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_user(&id, name, "argon2-hash", "guest").expect("create user");
    id
}

/// First member acts as creator.
pub(crate) fn make_conversation(db: &Database, members: &[&str]) -> String {
    let id = Uuid::new_v4().to_string();
    let rest: Vec<String> = members[1..].iter().map(|m| m.to_string()).collect();
    db.create_conversation(&id, members[0], &rest).expect("create conversation");
    id
}

pub(crate) fn new_message<'a>(
    conversation_id: &'a str,
    sender_id: &'a str,
    receiver_id: &'a str,
    parent_id: Option<&'a str>,
    content: &'a str,
    created_at: &'a str,
) -> NewMessage<'a> {
    NewMessage {
        id: "msg-under-test",
        conversation_id,
        sender_id,
        receiver_id,
        parent_id,
        content,
        created_at,
    }
}

pub(crate) fn send(
    db: &Database,
    conversation_id: &str,
    sender_id: &str,
    receiver_id: &str,
    parent_id: Option<&str>,
    content: &str,
    created_at: &str,
) -> MessageRow {
    let id = Uuid::new_v4().to_string();
    db.create_message(NewMessage {
        id: &id,
        conversation_id,
        sender_id,
        receiver_id,
        parent_id,
        content,
        created_at,
    })
    .expect("create message")
}
