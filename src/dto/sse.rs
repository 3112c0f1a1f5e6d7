use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::contest::{ContestSummary, ParticipantSummary, QuestionSummary},
    state::feed::ChangeKind,
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name; `None` sends a plain message.
    pub event: Option<String>,
    /// Serialized payload.
    pub data: String,
    /// Contest the event belongs to; `None` for stream-wide events.
    pub contest_id: Option<Uuid>,
}

impl ServerEvent {
    /// Stream-wide event.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self {
            event,
            data,
            contest_id: None,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self::new(event.into(), serde_json::to_string(payload)?))
    }

    /// Scope the event to one contest stream.
    pub fn for_contest(mut self, contest_id: Uuid) -> Self {
        self.contest_id = Some(contest_id);
        self
    }

    /// Whether a subscriber of `contest_id` should receive this event.
    pub fn visible_to(&self, contest_id: Uuid) -> bool {
        self.contest_id.is_none_or(|id| id == contest_id)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`contest`, `round` or `admin`).
    pub stream: String,
    /// Greeting text.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Token sent to the admin stream; required in the `x-admin-token` header.
pub struct AdminHandshake {
    /// Admin token.
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// Whether the storage backend is unreachable.
    pub degraded: bool,
}

/// Kind of a change carried by an SSE event.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKindDto {
    /// Row inserted.
    Created,
    /// Row replaced.
    Updated,
    /// Row removed.
    Deleted,
}

impl From<ChangeKind> for ChangeKindDto {
    fn from(value: ChangeKind) -> Self {
        match value {
            ChangeKind::Created => Self::Created,
            ChangeKind::Updated => Self::Updated,
            ChangeKind::Deleted => Self::Deleted,
        }
    }
}

/// Contest change.
#[derive(Debug, Serialize, ToSchema)]
pub struct ContestChangedEvent {
    /// What happened.
    pub kind: ChangeKindDto,
    /// Contest after the change.
    pub contest: ContestSummary,
}

/// Participant change.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantChangedEvent {
    /// What happened.
    pub kind: ChangeKindDto,
    /// Participant after the change.
    pub participant: ParticipantSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Question change; the correct option is omitted on public streams while answers are open.
pub struct QuestionChangedEvent {
    /// What happened.
    pub kind: ChangeKindDto,
    /// Question after the change.
    pub question: QuestionSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Admin-only notification of a recorded answer.
pub struct AnswerRecordedEvent {
    /// Contest answered in.
    pub contest_id: Uuid,
    /// Participant who answered.
    pub participant_id: Uuid,
    /// Round answered.
    pub round: u32,
    /// `None` for a blank submission.
    pub answer: Option<String>,
}
