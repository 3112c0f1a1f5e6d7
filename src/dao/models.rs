use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Contest row as persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContestEntity {
    /// Primary key of the contest.
    pub id: Uuid,
    /// Display name of the contest.
    pub name: String,
    /// Scheduled start time announced to participants.
    pub starts_at: Option<SystemTime>,
    /// Whether participants may currently join.
    pub lobby_open: bool,
    /// Whether the submission window of the current round is open.
    pub submission_open: bool,
    /// Current round number (0 while the contest sits in the lobby).
    pub current_round: u32,
    /// Whether the contest is over.
    pub finished: bool,
    /// Last round whose submission window was closed.
    #[serde(default)]
    pub closed_round: Option<u32>,
    /// Optimistic concurrency counter, bumped on every write.
    #[serde(default)]
    pub version: u64,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the contest row was updated.
    pub updated_at: SystemTime,
}

/// Participant row as persisted by the storage layer.
///
/// `active` and `elimination_round` are stored as two columns for compatibility with the
/// existing data, but they are always written together from a single status value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Primary key of the participant.
    pub id: Uuid,
    /// Contest the participant joined.
    pub contest_id: Uuid,
    /// Identity of the signed-in user behind this participant.
    pub user_id: Uuid,
    /// Name shown in the lobby and on the admin console.
    pub display_name: String,
    /// Whether the participant is still in the running.
    pub active: bool,
    /// Round in which the participant was eliminated.
    pub elimination_round: Option<u32>,
    /// Round whose already settled outcome an admin waived when reinstating the participant.
    #[serde(default)]
    pub reinstated_round: Option<u32>,
    /// Optimistic concurrency counter, bumped on every write.
    #[serde(default)]
    pub version: u64,
    /// When the participant joined the contest.
    pub joined_at: SystemTime,
}

/// Question row as persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Primary key of the question.
    pub id: Uuid,
    /// Contest the question belongs to.
    pub contest_id: Uuid,
    /// Round in which the question is asked (starting at 1).
    pub round: u32,
    /// Question text.
    pub text: String,
    /// Ordered answer options.
    pub options: Vec<String>,
    /// Correct option, published by the admin once the window closed.
    pub correct_option: Option<String>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the question was edited.
    pub updated_at: SystemTime,
}

/// Answer row as persisted by the storage layer. Answers are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Primary key of the answer.
    pub id: Uuid,
    /// Contest the answer was given in.
    pub contest_id: Uuid,
    /// Participant who answered.
    pub participant_id: Uuid,
    /// Round the answer belongs to.
    pub round: u32,
    /// Selected option; `None` records a blank submission.
    pub answer: Option<String>,
    /// When the answer was recorded.
    pub submitted_at: SystemTime,
}
