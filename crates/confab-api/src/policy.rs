//! Access decisions, evaluated as an ordered pipeline: identity (the auth
//! middleware), then the time window, then the role rule, then participation.
//! The first failing rule determines the error; every denial carries its
//! reason.

use axum::{extract::Request, middleware::Next, response::Response};
use chrono::{Local, Timelike};

use confab_db::Database;
use confab_db::models::{ConversationRow, MessageRow};

use crate::error::ApiError;
use confab_types::models::Role;

/// Gated endpoints are reachable from this local hour...
pub const OPEN_HOUR: u32 = 18;
/// ...up to (excluding) this one.
pub const CLOSE_HOUR: u32 = 21;

/// Anything policy-checkable resolves to its owning conversation:
/// a conversation yields itself, a message yields the conversation it
/// belongs to.
pub trait ConversationScoped {
    fn conversation_id(&self) -> &str;
}

impl ConversationScoped for ConversationRow {
    fn conversation_id(&self) -> &str {
        &self.id
    }
}

impl ConversationScoped for MessageRow {
    fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

pub fn window_open(hour: u32) -> bool {
    (OPEN_HOUR..CLOSE_HOUR).contains(&hour)
}

pub fn ensure_window(hour: u32) -> Result<(), ApiError> {
    if window_open(hour) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "endpoint is only available between {:02}:00 and {:02}:00",
            OPEN_HOUR, CLOSE_HOUR
        )))
    }
}

/// Role rule for the messaging-write namespace.
pub fn ensure_admin(role: Role) -> Result<(), ApiError> {
    if role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin role required".into()))
    }
}

/// Participation rule: applies identically to reads and writes.
pub fn ensure_participant(user_id: &str, participants: &[String]) -> Result<(), ApiError> {
    if participants.iter().any(|p| p == user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "you are not a participant in this conversation".into(),
        ))
    }
}

/// Fetch the participant set of the target's owning conversation and apply
/// the participation rule.
pub fn check_participant<T: ConversationScoped>(
    db: &Database,
    user_id: &str,
    target: &T,
) -> Result<(), ApiError> {
    let participants = db.get_participants(target.conversation_id())?;
    ensure_participant(user_id, &participants)
}

/// Middleware form of the time-window rule, bound to the server's local
/// clock. Denies regardless of identity or role.
pub async fn restrict_by_hour(req: Request, next: Next) -> Result<Response, ApiError> {
    ensure_window(Local::now().hour())?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_covers_evening_hours_only() {
        assert!(!window_open(17));
        assert!(window_open(18));
        assert!(window_open(20));
        assert!(!window_open(21));
        assert!(!window_open(3));
    }

    #[test]
    fn window_denies_even_admins() {
        // The time rule is independent of identity and role; there is no
        // role argument to consult at all.
        assert!(ensure_window(9).is_err());
    }

    #[test]
    fn admin_rule() {
        assert!(ensure_admin(Role::Admin).is_ok());
        assert!(ensure_admin(Role::Host).is_err());
        assert!(ensure_admin(Role::Guest).is_err());
    }

    #[test]
    fn participant_rule() {
        let participants = vec!["alice".to_string(), "bob".to_string()];
        assert!(ensure_participant("alice", &participants).is_ok());
        assert!(ensure_participant("mallory", &participants).is_err());
    }

    #[test]
    fn denials_carry_reasons() {
        let err = ensure_participant("mallory", &[]).unwrap_err();
        match err {
            ApiError::Forbidden(reason) => assert!(reason.contains("participant")),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn entities_resolve_their_owning_conversation() {
        let convo = ConversationRow {
            id: "c-1".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        assert_eq!(convo.conversation_id(), "c-1");

        let msg = MessageRow {
            id: "m-1".into(),
            conversation_id: "c-1".into(),
            sender_id: "alice".into(),
            sender_username: "alice".into(),
            receiver_id: "bob".into(),
            parent_id: None,
            content: "hi".into(),
            edited: false,
            read: false,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        assert_eq!(msg.conversation_id(), "c-1");
    }
}
