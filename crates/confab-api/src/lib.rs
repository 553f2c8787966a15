pub mod auth;
pub mod conversations;
pub mod error;
pub mod history;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod policy;
pub mod rate_limit;
pub mod threads;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// Parse a stored UUID, logging and defaulting on corrupt data rather than
/// failing the whole response.
pub(crate) fn parse_uuid(value: &str, context: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' in {}: {}", value, context, e);
        Uuid::default()
    })
}

/// Parse a stored timestamp. SQLite defaults write "YYYY-MM-DD HH:MM:SS"
/// without a timezone, while app-stamped columns are RFC 3339; accept both.
pub(crate) fn parse_timestamp(value: &str, context: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' in {}: {}", value, context, e);
            DateTime::default()
        })
}
