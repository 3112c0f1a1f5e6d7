//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::{
    dao::repositories::{ParticipantFilter, Tally},
    dto::validation::{
        validate_correct_option, validate_not_blank, validate_options, validate_timestamp,
    },
};

/// Payload creating a contest in the lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateContestRequest {
    /// Display name of the contest.
    #[validate(length(min = 1, max = 120), custom(function = "validate_not_blank"))]
    pub name: String,
    /// Scheduled start, RFC 3339.
    #[validate(custom(function = "validate_timestamp"))]
    pub starts_at: Option<String>,
}

impl CreateContestRequest {
    /// Parsed `starts_at`, if present and valid.
    pub fn starts_at(&self) -> Option<std::time::SystemTime> {
        self.starts_at.as_deref().and_then(super::parse_system_time)
    }
}

/// Open or close the lobby or the submission window.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleRequest {
    /// `true` opens, `false` closes.
    pub open: bool,
}

/// Move the contest to another round.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRoundRequest {
    /// New current round; 0 keeps the contest in the lobby.
    pub round: u32,
}

/// Full question definition, used for creation and replacement.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_question_request"))]
pub struct QuestionRequest {
    /// Round the question belongs to, starting at 1.
    #[validate(range(min = 1))]
    pub round: u32,
    /// Question text.
    #[validate(custom(function = "validate_not_blank"))]
    pub text: String,
    /// At least two unique, non-blank options.
    #[validate(custom(function = "validate_options"))]
    pub options: Vec<String>,
    /// Must be one of `options` when set.
    #[serde(default)]
    pub correct_option: Option<String>,
}

fn validate_question_request(request: &QuestionRequest) -> Result<(), ValidationError> {
    validate_correct_option(&request.options, request.correct_option.as_deref())
}

/// Publish the correct option of a question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CorrectOptionRequest {
    /// One of the question's options.
    #[validate(custom(function = "validate_not_blank"))]
    pub option: String,
}

/// Put the participants eliminated in a round back in the running.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReinstateRequest {
    /// Round whose eliminated participants are put back.
    #[validate(range(min = 1))]
    pub round: u32,
}

/// Outcome of a bulk reinstatement.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReinstateResponse {
    /// Round that was targeted.
    pub round: u32,
    /// Participants eliminated in the round when the call started.
    pub intended: usize,
    /// Participants actually reinstated.
    pub reinstated: usize,
}

/// Status part of a participant listing filter.
#[derive(Debug, Default, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Everybody.
    #[default]
    All,
    /// Still in the running.
    Active,
    /// Out of the contest.
    Eliminated,
}

/// Filter for participant listings. `round` narrows `eliminated` to one round.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ParticipantQuery {
    /// Status to keep; all participants by default.
    #[serde(default)]
    pub status: Option<StatusFilter>,
    /// Elimination round, only meaningful with `eliminated`.
    pub round: Option<u32>,
}

impl From<ParticipantQuery> for ParticipantFilter {
    fn from(query: ParticipantQuery) -> Self {
        match (query.status.unwrap_or_default(), query.round) {
            (StatusFilter::All, _) => ParticipantFilter::All,
            (StatusFilter::Active, _) => ParticipantFilter::Active,
            (StatusFilter::Eliminated, Some(round)) => ParticipantFilter::EliminatedIn(round),
            (StatusFilter::Eliminated, None) => ParticipantFilter::Eliminated,
        }
    }
}

/// Narrow a question listing to one round.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QuestionQuery {
    /// Round to list.
    pub round: Option<u32>,
}

/// Answers given for one option.
#[derive(Debug, Serialize, ToSchema)]
pub struct OptionCount {
    /// Option text.
    pub option: String,
    /// Participants who picked it.
    pub count: usize,
}

/// Answer counts of a round, in option order.
#[derive(Debug, Serialize, ToSchema)]
pub struct TallyResponse {
    /// Tallied round.
    pub round: u32,
    /// Per-option counts.
    pub counts: Vec<OptionCount>,
    /// Blank submissions.
    pub blank: usize,
    /// All answers of the round.
    pub total: usize,
}

impl TallyResponse {
    /// Response for `round` from a repository tally.
    pub fn new(round: u32, tally: Tally) -> Self {
        let total = tally.total();
        Self {
            round,
            counts: tally
                .counts
                .into_iter()
                .map(|(option, count)| OptionCount { option, count })
                .collect(),
            blank: tally.blank,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_request_checks_correct_option() {
        let request = QuestionRequest {
            round: 1,
            text: "Worth six points?".into(),
            options: vec!["Touchdown".into(), "Punt".into()],
            correct_option: Some("Field goal".into()),
        };
        assert!(request.validate().is_err());

        let request = QuestionRequest {
            correct_option: Some("Touchdown".into()),
            ..request
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn question_round_starts_at_one() {
        let request = QuestionRequest {
            round: 0,
            text: "Worth six points?".into(),
            options: vec!["Touchdown".into(), "Punt".into()],
            correct_option: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("round"));
    }

    #[test]
    fn eliminated_filter_narrows_by_round() {
        let query = ParticipantQuery {
            status: Some(StatusFilter::Eliminated),
            round: Some(2),
        };
        assert_eq!(
            ParticipantFilter::from(query),
            ParticipantFilter::EliminatedIn(2)
        );
        assert_eq!(
            ParticipantFilter::from(ParticipantQuery::default()),
            ParticipantFilter::All
        );
    }
}
