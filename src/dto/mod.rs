use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Admin request and response payloads.
pub mod admin;
/// Contest, participant and question read models.
pub mod contest;
/// Health check payload.
pub mod health;
/// Participant round payloads.
pub mod participant;
/// Session payloads.
pub mod session;
/// Server-sent event payloads.
pub mod sse;
/// Shared validator rules.
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Parse an RFC 3339 timestamp supplied by a client.
fn parse_system_time(value: &str) -> Option<SystemTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .map(SystemTime::from)
}
