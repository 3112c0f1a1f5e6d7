use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::contest::{ParticipantSummary, QuestionSummary, WindowDto},
    services::round_lifecycle::{RoundView, ViewStatus},
    state::round::RoundState,
};

/// The option picked for the current round.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    /// Option text, compared against the question's options.
    pub selection: String,
}

/// Whether the round view reflects the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatusDto {
    /// Nothing loaded yet.
    Loading,
    /// Up to date.
    Live,
    /// The last reload failed.
    Errored,
}

/// Participant's own round state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundViewResponse {
    /// Freshness of the view.
    pub status: ViewStatusDto,
    /// Reason of the last failure when `status` is `errored`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `awaiting_round`, `answering`, `submitted`, `correct`, `eliminated` or `finished`.
    pub state: String,
    /// Round the state refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    /// Submitted option, while awaiting the correct one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Contest's current round.
    pub current_round: u32,
    /// Window of the current round.
    pub window: WindowDto,
    /// Question of the current round, once it is visible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionSummary>,
    /// Participant row of the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<Uuid>,
    /// Reinstatement checks left while eliminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinstatement_checks_left: Option<u32>,
}

impl From<RoundView> for RoundViewResponse {
    fn from(view: RoundView) -> Self {
        let (status, message) = match view.status {
            ViewStatus::Loading => (ViewStatusDto::Loading, None),
            ViewStatus::Live => (ViewStatusDto::Live, None),
            ViewStatus::Errored { message } => (ViewStatusDto::Errored, Some(message)),
        };
        let answer = match &view.state {
            RoundState::Submitted { answer, .. } => Some(answer.clone()),
            _ => None,
        };

        Self {
            status,
            message,
            state: view.state.label().to_owned(),
            round: view.state.round(),
            answer,
            current_round: view.current_round,
            window: view.window.into(),
            question: view
                .question
                .map(|question| QuestionSummary::public(question, view.window)),
            participant_id: view.participant_id,
            reinstatement_checks_left: view.reinstatement_checks_left,
        }
    }
}

/// Result of joining a contest.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    /// The caller's participant row.
    pub participant: ParticipantSummary,
    /// Round view right after joining.
    pub round: RoundViewResponse,
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::contest::{Question, RoundWindow};

    fn view(window: RoundWindow) -> RoundView {
        let now = SystemTime::now();
        RoundView {
            status: ViewStatus::Live,
            state: RoundState::Submitted {
                round: 1,
                answer: "Punt".into(),
            },
            participant_id: Some(Uuid::new_v4()),
            current_round: 1,
            window,
            question: Some(Question {
                id: Uuid::new_v4(),
                contest_id: Uuid::new_v4(),
                round: 1,
                text: "Worth six points?".into(),
                options: vec!["Touchdown".into(), "Punt".into()],
                correct_option: Some("Touchdown".into()),
                created_at: now,
                updated_at: now,
            }),
            reinstatement_checks_left: None,
        }
    }

    #[test]
    fn correct_option_hidden_while_window_open() {
        let open = RoundViewResponse::from(view(RoundWindow::Open));
        assert_eq!(open.question.unwrap().correct_option, None);
        assert_eq!(open.state, "submitted");
        assert_eq!(open.answer.as_deref(), Some("Punt"));

        let closed = RoundViewResponse::from(view(RoundWindow::Closed));
        assert_eq!(
            closed.question.unwrap().correct_option.as_deref(),
            Some("Touchdown")
        );
    }
}
