//! Pure derivation of a participant's round state from the freshest rows.
//!
//! Feed callbacks and the initial load both end up here, so the result never depends on the
//! order in which events of different tables arrived.

use crate::state::{
    contest::{Answer, AnswerMatching, Contest, Participant, ParticipantStatus, Question, RoundWindow},
    round::{RoundEvent, RoundState},
};

/// Everything the derivation looks at.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Contest as stored.
    pub contest: Contest,
    /// Participant as stored.
    pub participant: Participant,
    /// Question of the contest's current round, if one exists.
    pub question: Option<Question>,
    /// Authoritative answer of the participant for the current round.
    pub answer: Option<Answer>,
}

/// Writes that must happen before the target state is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Insert a blank answer for the round.
    RecordBlank {
        /// Round the blank answer belongs to.
        round: u32,
    },
    /// Mark the participant eliminated in the round.
    Eliminate {
        /// Round the participant goes out in.
        round: u32,
    },
}

/// Target state plus the writes needed to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    /// State the lifecycle should end up in.
    pub target: RoundState,
    /// Writes to perform first, in order.
    pub effects: Vec<Effect>,
}

impl Derivation {
    fn settled(target: RoundState) -> Self {
        Self {
            target,
            effects: Vec::new(),
        }
    }
}

/// Derive where the participant stands from the freshest rows.
pub fn derive(observation: &Observation, matching: AnswerMatching) -> Derivation {
    let Observation {
        contest,
        participant,
        question,
        answer,
    } = observation;

    if let ParticipantStatus::Eliminated { round } = participant.status {
        return Derivation::settled(RoundState::Eliminated { round });
    }

    let round = contest.current_round;
    if round == 0 {
        return Derivation::settled(finish_if_over(contest, RoundState::AwaitingRound { round }));
    }

    let reinstated = participant.reinstated_round == Some(round);
    let eliminate = |mut effects: Vec<Effect>| {
        if reinstated {
            Derivation::settled(finish_if_over(contest, RoundState::Correct { round }))
        } else {
            effects.push(Effect::Eliminate { round });
            Derivation {
                target: RoundState::Eliminated { round },
                effects,
            }
        }
    };

    match answer.as_ref().map(|answer| answer.answer.as_deref()) {
        Some(None) => eliminate(Vec::new()),
        Some(Some(choice)) => {
            let correct_option = question
                .as_ref()
                .and_then(|question| question.correct_option.as_deref());
            match correct_option {
                Some(correct) if matching.matches(choice, correct) => {
                    Derivation::settled(finish_if_over(contest, RoundState::Correct { round }))
                }
                Some(_) => eliminate(Vec::new()),
                None => Derivation::settled(RoundState::Submitted {
                    round,
                    answer: choice.to_owned(),
                }),
            }
        }
        None => match (question, contest.window()) {
            (Some(question), RoundWindow::Open) if !contest.finished => {
                Derivation::settled(RoundState::Answering {
                    round,
                    question_id: question.id,
                })
            }
            (Some(_), RoundWindow::Closed) => eliminate(vec![Effect::RecordBlank { round }]),
            _ => Derivation::settled(finish_if_over(contest, RoundState::AwaitingRound { round })),
        },
    }
}

fn finish_if_over(contest: &Contest, state: RoundState) -> RoundState {
    match state {
        RoundState::AwaitingRound { .. } | RoundState::Correct { .. } if contest.finished => {
            RoundState::Finished
        }
        other => other,
    }
}

/// Next event moving `current` one step closer to `target`, or `None` once there.
///
/// Steps follow the regular transitions when one applies and fall back to
/// [`RoundEvent::Resync`] otherwise.
pub fn next_event(current: &RoundState, target: &RoundState) -> Option<RoundEvent> {
    use RoundState as S;

    if current == target {
        return None;
    }

    let event = match (current, target) {
        (S::Eliminated { round }, target) if !target.is_eliminated() => {
            RoundEvent::Reinstated { round: *round }
        }
        (current, S::Finished) if !current.is_eliminated() => RoundEvent::ContestFinished,
        (S::Correct { round } | S::AwaitingRound { round }, target)
            if target.round().is_some_and(|next| next > *round) =>
        {
            RoundEvent::RoundAdvanced {
                round: target.round().unwrap_or(*round),
            }
        }
        (S::AwaitingRound { round }, S::Answering { round: r, question_id }) if r == round => {
            RoundEvent::QuestionOpened {
                round: *r,
                question_id: *question_id,
            }
        }
        (S::Answering { round, .. }, S::Submitted { round: r, answer }) if r == round => {
            RoundEvent::AnswerSubmitted {
                answer: answer.clone(),
            }
        }
        (
            S::Answering { round, .. } | S::AwaitingRound { round },
            S::Eliminated { round: r },
        ) if r == round && *round > 0 => RoundEvent::WindowClosed,
        (S::Submitted { round, .. }, S::Correct { round: r }) if r == round => {
            RoundEvent::Judged { correct: true }
        }
        (S::Submitted { round, .. }, S::Eliminated { round: r }) if r == round => {
            RoundEvent::Judged { correct: false }
        }
        (_, target) => RoundEvent::Resync(target.clone()),
    };

    Some(event)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::state::round::RoundMachine;

    struct Fixture {
        observation: Observation,
    }

    impl Fixture {
        fn new() -> Self {
            let mut contest = Contest::new("Gridiron".into(), None);
            contest.current_round = 1;
            contest.submission_open = true;
            let participant = Participant::new(contest.id, Uuid::new_v4(), "Ada".into());
            let question = Question {
                id: Uuid::new_v4(),
                contest_id: contest.id,
                round: 1,
                text: "Worth six points?".into(),
                options: vec!["Touchdown".into(), "Punt".into()],
                correct_option: None,
                created_at: contest.created_at,
                updated_at: contest.created_at,
            };
            Self {
                observation: Observation {
                    contest,
                    participant,
                    question: Some(question),
                    answer: None,
                },
            }
        }

        fn answered(mut self, value: Option<&str>) -> Self {
            let obs = &self.observation;
            self.observation.answer = Some(Answer::new(
                obs.contest.id,
                obs.participant.id,
                obs.contest.current_round,
                value.map(str::to_owned),
            ));
            self
        }

        fn correct(mut self, option: &str) -> Self {
            if let Some(question) = self.observation.question.as_mut() {
                question.correct_option = Some(option.to_owned());
            }
            self
        }

        fn closed(mut self) -> Self {
            self.observation.contest.submission_open = false;
            self.observation.contest.closed_round = Some(self.observation.contest.current_round);
            self
        }

        fn derive(&self) -> Derivation {
            derive(&self.observation, AnswerMatching::Exact)
        }
    }

    fn walk(from: RoundState, to: &RoundState) -> Vec<RoundEvent> {
        let mut sm = RoundMachine::new();
        let plan = sm.plan(RoundEvent::Resync(from)).unwrap();
        sm.apply(plan.id).unwrap();

        let mut events = Vec::new();
        while let Some(event) = next_event(sm.state(), to) {
            events.push(event.clone());
            let plan = sm.plan(event).unwrap();
            sm.apply(plan.id).unwrap();
            assert!(events.len() < 8, "no convergence: {events:?}");
        }
        events
    }

    #[test]
    fn open_window_without_answer_is_answering() {
        let fixture = Fixture::new();
        let question_id = fixture.observation.question.as_ref().unwrap().id;
        assert_eq!(
            fixture.derive(),
            Derivation::settled(RoundState::Answering {
                round: 1,
                question_id
            })
        );
    }

    #[test]
    fn submitted_waits_for_correct_option() {
        let derivation = Fixture::new().answered(Some("Punt")).closed().derive();
        assert_eq!(
            derivation.target,
            RoundState::Submitted {
                round: 1,
                answer: "Punt".into()
            }
        );
        assert!(derivation.effects.is_empty());
    }

    #[test]
    fn wrong_answer_eliminates_once_option_is_set() {
        let derivation = Fixture::new()
            .answered(Some("Punt"))
            .correct("Touchdown")
            .derive();
        assert_eq!(derivation.target, RoundState::Eliminated { round: 1 });
        assert_eq!(derivation.effects, vec![Effect::Eliminate { round: 1 }]);
    }

    #[test]
    fn matching_answer_is_correct() {
        let derivation = Fixture::new()
            .answered(Some("Touchdown"))
            .correct("Touchdown")
            .derive();
        assert_eq!(derivation, Derivation::settled(RoundState::Correct { round: 1 }));
    }

    #[test]
    fn blank_answer_is_wrong_even_before_option_is_set() {
        let derivation = Fixture::new().answered(None).closed().derive();
        assert_eq!(derivation.target, RoundState::Eliminated { round: 1 });
        assert_eq!(derivation.effects, vec![Effect::Eliminate { round: 1 }]);
    }

    #[test]
    fn closed_window_without_answer_records_blank() {
        let derivation = Fixture::new().closed().derive();
        assert_eq!(derivation.target, RoundState::Eliminated { round: 1 });
        assert_eq!(
            derivation.effects,
            vec![
                Effect::RecordBlank { round: 1 },
                Effect::Eliminate { round: 1 }
            ]
        );
    }

    #[test]
    fn window_not_opened_waits() {
        let mut fixture = Fixture::new();
        fixture.observation.contest.submission_open = false;
        assert_eq!(
            fixture.derive(),
            Derivation::settled(RoundState::AwaitingRound { round: 1 })
        );
    }

    #[test]
    fn eliminated_row_wins_over_everything() {
        let mut fixture = Fixture::new().answered(Some("Touchdown")).correct("Touchdown");
        fixture.observation.participant.status = ParticipantStatus::Eliminated { round: 1 };
        fixture.observation.contest.current_round = 3;
        assert_eq!(
            fixture.derive(),
            Derivation::settled(RoundState::Eliminated { round: 1 })
        );
    }

    #[test]
    fn reinstated_participant_survives_the_round() {
        let mut fixture = Fixture::new()
            .answered(Some("Punt"))
            .correct("Touchdown");
        fixture.observation.participant.reinstated_round = Some(1);
        assert_eq!(
            fixture.derive(),
            Derivation::settled(RoundState::Correct { round: 1 })
        );
    }

    #[test]
    fn finished_contest_finishes_survivors() {
        let mut fixture = Fixture::new()
            .answered(Some("Touchdown"))
            .correct("Touchdown")
            .closed();
        fixture.observation.contest.finished = true;
        assert_eq!(fixture.derive().target, RoundState::Finished);
    }

    #[test]
    fn case_insensitive_matching_is_configurable() {
        let fixture = Fixture::new()
            .answered(Some("touchdown "))
            .correct("Touchdown");
        assert_eq!(
            derive(&fixture.observation, AnswerMatching::CaseInsensitive).target,
            RoundState::Correct { round: 1 }
        );
        assert_eq!(fixture.derive().target, RoundState::Eliminated { round: 1 });
    }

    #[test]
    fn latest_answer_decides_with_legacy_duplicates() {
        let fixture = Fixture::new();
        let obs = &fixture.observation;
        let early = Answer::new(obs.contest.id, obs.participant.id, 1, Some("Punt".into()));
        let mut late = Answer::new(
            obs.contest.id,
            obs.participant.id,
            1,
            Some("Touchdown".into()),
        );
        late.submitted_at = early.submitted_at + Duration::from_secs(5);

        let mut fixture = fixture.correct("Touchdown");
        fixture.observation.answer = Answer::authoritative([late, early]);
        assert_eq!(fixture.derive().target, RoundState::Correct { round: 1 });
    }

    #[test]
    fn round_advance_walks_correct_to_next_question() {
        let question_id = Uuid::new_v4();
        let events = walk(
            RoundState::Correct { round: 2 },
            &RoundState::Answering {
                round: 3,
                question_id,
            },
        );
        assert_eq!(
            events,
            vec![
                RoundEvent::RoundAdvanced { round: 3 },
                RoundEvent::QuestionOpened {
                    round: 3,
                    question_id
                },
            ]
        );
    }

    #[test]
    fn reinstatement_resumes_in_current_round() {
        let events = walk(
            RoundState::Eliminated { round: 2 },
            &RoundState::AwaitingRound { round: 3 },
        );
        assert_eq!(
            events,
            vec![
                RoundEvent::Reinstated { round: 2 },
                RoundEvent::RoundAdvanced { round: 3 },
            ]
        );
    }

    #[test]
    fn window_closing_and_judging_use_regular_events() {
        assert_eq!(
            walk(
                RoundState::Answering {
                    round: 1,
                    question_id: Uuid::new_v4()
                },
                &RoundState::Eliminated { round: 1 }
            ),
            vec![RoundEvent::WindowClosed]
        );
        assert_eq!(
            walk(
                RoundState::Submitted {
                    round: 1,
                    answer: "Punt".into()
                },
                &RoundState::Eliminated { round: 1 }
            ),
            vec![RoundEvent::Judged { correct: false }]
        );
    }

    #[test]
    fn unreachable_targets_resync() {
        let target = RoundState::Submitted {
            round: 4,
            answer: "Punt".into(),
        };
        assert_eq!(
            walk(RoundState::AwaitingRound { round: 4 }, &target),
            vec![RoundEvent::Resync(target)]
        );
    }
}
