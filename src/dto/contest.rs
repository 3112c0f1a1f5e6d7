//! Read models for contests, participants and questions.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::contest::{Contest, ContestPhase, Participant, ParticipantStatus, Question, RoundWindow},
};

/// Contest phase as exposed to clients.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PhaseDto {
    /// No round has started yet.
    Lobby,
    /// A round is under way.
    InRound,
    /// The contest is over.
    Finished,
}

/// Submission window of the current round.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindowDto {
    /// Not opened yet.
    NotOpened,
    /// Accepting answers.
    Open,
    /// Closed for good.
    Closed,
}

impl From<RoundWindow> for WindowDto {
    fn from(value: RoundWindow) -> Self {
        match value {
            RoundWindow::NotOpened => Self::NotOpened,
            RoundWindow::Open => Self::Open,
            RoundWindow::Closed => Self::Closed,
        }
    }
}

/// Contest as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContestSummary {
    /// Contest identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Scheduled start, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    /// Derived phase.
    pub phase: PhaseDto,
    /// Whether participants can join.
    pub lobby_open: bool,
    /// Whether answers are accepted.
    pub submission_open: bool,
    /// Current round; 0 while in the lobby.
    pub current_round: u32,
    /// Window of the current round.
    pub window: WindowDto,
    /// Whether the contest is over.
    pub finished: bool,
    /// Last round whose window was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_round: Option<u32>,
    /// Last change, RFC 3339.
    pub updated_at: String,
}

impl From<Contest> for ContestSummary {
    fn from(contest: Contest) -> Self {
        let phase = match contest.phase() {
            ContestPhase::Lobby => PhaseDto::Lobby,
            ContestPhase::InRound(_) => PhaseDto::InRound,
            ContestPhase::Finished => PhaseDto::Finished,
        };
        Self {
            window: contest.window().into(),
            id: contest.id,
            name: contest.name,
            starts_at: contest.starts_at.map(format_system_time),
            phase,
            lobby_open: contest.lobby_open,
            submission_open: contest.submission_open,
            current_round: contest.current_round,
            finished: contest.finished,
            closed_round: contest.closed_round,
            updated_at: format_system_time(contest.updated_at),
        }
    }
}

/// Participant row. `active` and `elimination_round` always agree.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Participant identifier.
    pub id: Uuid,
    /// Contest joined.
    pub contest_id: Uuid,
    /// User behind the participant.
    pub user_id: Uuid,
    /// Name shown to others.
    pub display_name: String,
    /// Still in the running.
    pub active: bool,
    /// Round the participant went out in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elimination_round: Option<u32>,
    /// Round whose settled outcome was waived by a reinstatement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinstated_round: Option<u32>,
    /// Join time, RFC 3339.
    pub joined_at: String,
}

impl From<Participant> for ParticipantSummary {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id,
            contest_id: participant.contest_id,
            user_id: participant.user_id,
            display_name: participant.display_name,
            active: participant.status == ParticipantStatus::Active,
            elimination_round: participant.status.elimination_round(),
            reinstated_round: participant.reinstated_round,
            joined_at: format_system_time(participant.joined_at),
        }
    }
}

/// Question as seen by admins, correct option included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSummary {
    /// Question identifier.
    pub id: Uuid,
    /// Contest the question belongs to.
    pub contest_id: Uuid,
    /// Round the question is asked in.
    pub round: u32,
    /// Question text.
    pub text: String,
    /// Options in display order.
    pub options: Vec<String>,
    /// Correct option, hidden from participants while answers are open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<String>,
    /// Last change, RFC 3339.
    pub updated_at: String,
}

impl From<Question> for QuestionSummary {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            contest_id: question.contest_id,
            round: question.round,
            text: question.text,
            options: question.options,
            correct_option: question.correct_option,
            updated_at: format_system_time(question.updated_at),
        }
    }
}

impl QuestionSummary {
    /// Public projection: the correct option stays hidden while answers are accepted.
    pub fn public(question: Question, window: RoundWindow) -> Self {
        let mut summary = Self::from(question);
        if window == RoundWindow::Open {
            summary.correct_option = None;
        }
        summary
    }
}
