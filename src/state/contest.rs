//! Domain records built from the persisted rows.
//!
//! The stored rows keep the historical boolean columns (`lobby_open`, `submission_open`,
//! `finished`, `active`, `elimination_round`); everything above the DAO layer reasons about the
//! tagged projections defined here instead.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::{
    models::{AnswerEntity, ContestEntity, ParticipantEntity, QuestionEntity},
    storage::StorageError,
};

/// Where a contest stands overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContestPhase {
    /// No round has started yet.
    Lobby,
    /// The given round is the current one.
    InRound(u32),
    /// The contest is over.
    Finished,
}

/// Submission window of the contest's current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundWindow {
    /// No window opened for the round yet.
    NotOpened,
    /// Answers are accepted.
    Open,
    /// The window closed; it cannot reopen.
    Closed,
}

/// A contest and its round controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contest {
    /// Contest identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Scheduled start.
    pub starts_at: Option<SystemTime>,
    /// Whether participants can join.
    pub lobby_open: bool,
    /// Whether the current round accepts answers.
    pub submission_open: bool,
    /// Current round; 0 while in the lobby.
    pub current_round: u32,
    /// Whether the contest is over.
    pub finished: bool,
    /// Last round whose window was closed.
    pub closed_round: Option<u32>,
    /// Optimistic concurrency counter.
    pub version: u64,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last change.
    pub updated_at: SystemTime,
}

impl Contest {
    /// Contest in the lobby, lobby closed.
    pub fn new(name: String, starts_at: Option<SystemTime>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            name,
            starts_at,
            lobby_open: false,
            submission_open: false,
            current_round: 0,
            finished: false,
            closed_round: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived phase.
    pub fn phase(&self) -> ContestPhase {
        if self.finished {
            ContestPhase::Finished
        } else if self.current_round == 0 {
            ContestPhase::Lobby
        } else {
            ContestPhase::InRound(self.current_round)
        }
    }

    /// Window of the current round.
    pub fn window(&self) -> RoundWindow {
        if self.submission_open {
            RoundWindow::Open
        } else if self.current_round > 0 && self.closed_round == Some(self.current_round) {
            RoundWindow::Closed
        } else {
            RoundWindow::NotOpened
        }
    }
}

impl From<ContestEntity> for Contest {
    fn from(value: ContestEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            starts_at: value.starts_at,
            lobby_open: value.lobby_open,
            submission_open: value.submission_open,
            current_round: value.current_round,
            finished: value.finished,
            closed_round: value.closed_round,
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<Contest> for ContestEntity {
    fn from(value: Contest) -> Self {
        Self {
            id: value.id,
            name: value.name,
            starts_at: value.starts_at,
            lobby_open: value.lobby_open,
            submission_open: value.submission_open,
            current_round: value.current_round,
            finished: value.finished,
            closed_round: value.closed_round,
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// Whether a participant is still in the running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    /// Still in the running.
    Active,
    /// Out of the contest.
    Eliminated {
        /// Round the participant went out in.
        round: u32,
    },
}

impl ParticipantStatus {
    /// Rebuild the status from the stored column pair, rejecting inconsistent rows.
    pub fn from_flags(active: bool, elimination_round: Option<u32>) -> Option<Self> {
        match (active, elimination_round) {
            (true, None) => Some(Self::Active),
            (false, Some(round)) => Some(Self::Eliminated { round }),
            _ => None,
        }
    }

    /// Whether the participant is still in the running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Round the participant went out in, if eliminated.
    pub fn elimination_round(self) -> Option<u32> {
        match self {
            Self::Active => None,
            Self::Eliminated { round } => Some(round),
        }
    }
}

/// A user taking part in a contest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Participant identifier.
    pub id: Uuid,
    /// Contest joined.
    pub contest_id: Uuid,
    /// User behind the participant.
    pub user_id: Uuid,
    /// Name shown to others.
    pub display_name: String,
    /// Active or eliminated.
    pub status: ParticipantStatus,
    /// Round whose already settled outcome an admin waived when reinstating the participant.
    pub reinstated_round: Option<u32>,
    /// Optimistic concurrency counter.
    pub version: u64,
    /// Join time.
    pub joined_at: SystemTime,
}

impl Participant {
    /// Fresh active participant.
    pub fn new(contest_id: Uuid, user_id: Uuid, display_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            contest_id,
            user_id,
            display_name,
            status: ParticipantStatus::Active,
            reinstated_round: None,
            version: 0,
            joined_at: SystemTime::now(),
        }
    }
}

impl TryFrom<ParticipantEntity> for Participant {
    type Error = StorageError;

    fn try_from(value: ParticipantEntity) -> Result<Self, Self::Error> {
        let status = ParticipantStatus::from_flags(value.active, value.elimination_round)
            .ok_or_else(|| {
                StorageError::corrupt(format!(
                    "participant `{}` has active={} with elimination_round={:?}",
                    value.id, value.active, value.elimination_round
                ))
            })?;

        Ok(Self {
            id: value.id,
            contest_id: value.contest_id,
            user_id: value.user_id,
            display_name: value.display_name,
            status,
            reinstated_round: value.reinstated_round,
            version: value.version,
            joined_at: value.joined_at,
        })
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            id: value.id,
            contest_id: value.contest_id,
            user_id: value.user_id,
            display_name: value.display_name,
            active: value.status.is_active(),
            elimination_round: value.status.elimination_round(),
            reinstated_round: value.reinstated_round,
            version: value.version,
            joined_at: value.joined_at,
        }
    }
}

/// The multiple-choice question of one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
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
    /// Correct option, once published.
    pub correct_option: Option<String>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last change.
    pub updated_at: SystemTime,
}

impl Question {
    /// New question with fresh id and timestamps.
    pub fn new(
        contest_id: Uuid,
        round: u32,
        text: String,
        options: Vec<String>,
        correct_option: Option<String>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            contest_id,
            round,
            text,
            options,
            correct_option,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `option` is one of the options.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|candidate| candidate == option)
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            contest_id: value.contest_id,
            round: value.round,
            text: value.text,
            options: value.options,
            correct_option: value.correct_option,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<Question> for QuestionEntity {
    fn from(value: Question) -> Self {
        Self {
            id: value.id,
            contest_id: value.contest_id,
            round: value.round,
            text: value.text,
            options: value.options,
            correct_option: value.correct_option,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// A participant's answer for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Answer identifier.
    pub id: Uuid,
    /// Contest answered in.
    pub contest_id: Uuid,
    /// Participant who answered.
    pub participant_id: Uuid,
    /// Round answered.
    pub round: u32,
    /// `None` records a blank submission.
    pub answer: Option<String>,
    /// Submission time.
    pub submitted_at: SystemTime,
}

impl Answer {
    /// Answer submitted now.
    pub fn new(contest_id: Uuid, participant_id: Uuid, round: u32, answer: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            contest_id,
            participant_id,
            round,
            answer,
            submitted_at: SystemTime::now(),
        }
    }

    /// Pick the answer that counts among several rows for the same participant and round:
    /// the most recent one.
    pub fn authoritative(answers: impl IntoIterator<Item = Answer>) -> Option<Answer> {
        answers.into_iter().max_by_key(|answer| answer.submitted_at)
    }
}

impl From<AnswerEntity> for Answer {
    fn from(value: AnswerEntity) -> Self {
        Self {
            id: value.id,
            contest_id: value.contest_id,
            participant_id: value.participant_id,
            round: value.round,
            answer: value.answer,
            submitted_at: value.submitted_at,
        }
    }
}

impl From<Answer> for AnswerEntity {
    fn from(value: Answer) -> Self {
        Self {
            id: value.id,
            contest_id: value.contest_id,
            participant_id: value.participant_id,
            round: value.round,
            answer: value.answer,
            submitted_at: value.submitted_at,
        }
    }
}

/// How a stored answer is compared against the correct option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMatching {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Equality after trimming surrounding whitespace.
    Trimmed,
    /// Trimmed, case-insensitive equality.
    CaseInsensitive,
}

impl AnswerMatching {
    /// Whether `answer` counts as `correct`.
    pub fn matches(self, answer: &str, correct: &str) -> bool {
        match self {
            Self::Exact => answer == correct,
            Self::Trimmed => answer.trim() == correct.trim(),
            Self::CaseInsensitive => answer.trim().to_lowercase() == correct.trim().to_lowercase(),
        }
    }
}
