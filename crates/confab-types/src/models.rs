use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access level attached to every account. Stored lowercase in the DB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Host,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Host => "host",
            Role::Admin => "admin",
        }
    }

    /// Parse the stored representation. Unknown values fall back to Guest
    /// rather than failing — a row written by a newer build should not make
    /// an older account unreadable.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "host" => Role::Host,
            _ => Role::Guest,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Guest
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub edited: bool,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a message's content before an edit. Append-only; rows are
/// written by the edit trigger and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHistory {
    pub id: Uuid,
    pub message_id: Uuid,
    pub old_content: String,
    pub edited_by: Uuid,
    pub edited_at: DateTime<Utc>,
}

/// Written by the message-creation trigger for the receiver. Clients can
/// only read these; there is no create/update surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message_id: Uuid,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [Role::Guest, Role::Host, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), role);
        }
    }

    #[test]
    fn unknown_role_falls_back_to_guest() {
        assert_eq!(Role::parse("moderator"), Role::Guest);
        assert_eq!(Role::parse(""), Role::Guest);
    }
}
