/// Database row types — these map directly to SQLite rows.
/// Distinct from the confab-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct ConversationRow {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub edited: bool,
    pub read: bool,
    pub created_at: String,
}

pub struct HistoryRow {
    pub id: String,
    pub message_id: String,
    pub old_content: String,
    pub edited_by: String,
    pub edited_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub message_id: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Fields for a message insert. The caller stamps `created_at` so the stored
/// value and the API response agree on the timestamp.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub content: &'a str,
    pub created_at: &'a str,
}
