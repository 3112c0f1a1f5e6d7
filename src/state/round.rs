use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// Where a single participant stands in the current contest round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundState {
    /// No question is open for the round yet.
    AwaitingRound {
        /// Round being waited on (0 while the contest sits in the lobby).
        round: u32,
    },
    /// The submission window is open and the participant has not answered.
    Answering {
        /// Current round.
        round: u32,
        /// Question shown to the participant.
        question_id: Uuid,
    },
    /// An answer was recorded and awaits the correct option.
    Submitted {
        /// Current round.
        round: u32,
        /// Option the participant picked.
        answer: String,
    },
    /// The participant survived the round.
    Correct {
        /// Round that was survived.
        round: u32,
    },
    /// The participant is out.
    Eliminated {
        /// Round in which the participant was eliminated.
        round: u32,
    },
    /// The contest ended while the participant was still in the running.
    Finished,
}

impl RoundState {
    /// Round the state refers to, if any.
    pub fn round(&self) -> Option<u32> {
        match self {
            Self::AwaitingRound { round }
            | Self::Answering { round, .. }
            | Self::Submitted { round, .. }
            | Self::Correct { round }
            | Self::Eliminated { round } => Some(*round),
            Self::Finished => None,
        }
    }

    /// Whether the participant is out.
    pub fn is_eliminated(&self) -> bool {
        matches!(self, Self::Eliminated { .. })
    }

    /// Short machine-readable name used in logs and DTOs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingRound { .. } => "awaiting_round",
            Self::Answering { .. } => "answering",
            Self::Submitted { .. } => "submitted",
            Self::Correct { .. } => "correct",
            Self::Eliminated { .. } => "eliminated",
            Self::Finished => "finished",
        }
    }
}

/// Events driving a participant's [`RoundState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// The window opened on a question for the round being waited on.
    QuestionOpened {
        /// Round of the question.
        round: u32,
        /// Question now visible.
        question_id: Uuid,
    },
    /// The participant's selection was recorded.
    AnswerSubmitted {
        /// Selected option.
        answer: String,
    },
    /// The window closed before the participant answered.
    WindowClosed,
    /// The correct option was published for the submitted answer.
    Judged {
        /// Whether the answer matched.
        correct: bool,
    },
    /// The contest moved on to a later round.
    RoundAdvanced {
        /// New current round.
        round: u32,
    },
    /// An admin put the participant back in the running.
    Reinstated {
        /// Round the participant resumes in.
        round: u32,
    },
    /// The contest was finished.
    ContestFinished,
    /// Jump straight to a state derived from the store when no single event leads there.
    Resync(RoundState),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The state when the invalid event was received.
    pub from: RoundState,
    /// The event that cannot be applied from this state.
    pub event: RoundEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current state.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State changed since the plan was created.
    StateMismatch {
        /// State when the plan was created.
        expected: RoundState,
        /// Current state.
        actual: RoundState,
    },
    /// Version changed since the plan was created.
    VersionMismatch {
        /// Version the plan expected to produce.
        expected: usize,
        /// Version the machine would produce now.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition whose side effects have not run yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// State when the plan was made.
    pub from: RoundState,
    /// State once applied.
    pub to: RoundState,
    /// Event that triggered the plan.
    pub event: RoundEvent,
    /// Version after applying.
    pub version_next: usize,
    /// When the plan was made.
    pub pending_since: Instant,
}

/// Point-in-time view of a [`RoundMachine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current state.
    pub state: RoundState,
    /// Applied transitions so far.
    pub version: usize,
    /// Target of the pending plan, if any.
    pub pending: Option<RoundState>,
}

/// Per-participant round machine. A pending plan blocks any other transition until it is
/// applied or aborted, which keeps one write in flight per participant.
#[derive(Debug, Clone)]
pub struct RoundMachine {
    state: RoundState,
    version: usize,
    pending: Option<Plan>,
}

impl Default for RoundMachine {
    fn default() -> Self {
        Self {
            state: RoundState::AwaitingRound { round: 0 },
            version: 0,
            pending: None,
        }
    }
}

impl RoundMachine {
    /// Machine waiting in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Whether a plan awaits apply or abort.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Copy of the machine's state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Validate `event` against the current state and reserve the transition.
    pub fn plan(&mut self, event: RoundEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.state.clone(),
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Commit the pending plan.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoundState, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.state != plan.from {
            return Err(ApplyError::StateMismatch {
                expected: plan.from,
                actual: self.state.clone(),
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.state = plan.to;
        self.version = plan.version_next;

        Ok(self.state.clone())
    }

    /// Drop the pending plan.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: RoundEvent) -> Result<RoundState, InvalidTransition> {
        use RoundEvent as E;
        use RoundState as S;

        let next = match (self.state.clone(), event) {
            (_, E::Resync(target)) => target,
            (S::AwaitingRound { round }, E::QuestionOpened { round: r, question_id })
                if r == round =>
            {
                S::Answering { round, question_id }
            }
            (S::Answering { round, .. }, E::AnswerSubmitted { answer }) => {
                S::Submitted { round, answer }
            }
            (S::Answering { round, .. } | S::AwaitingRound { round }, E::WindowClosed)
                if round > 0 =>
            {
                S::Eliminated { round }
            }
            (S::Submitted { round, .. }, E::Judged { correct: true }) => S::Correct { round },
            (S::Submitted { round, .. }, E::Judged { correct: false }) => S::Eliminated { round },
            (
                S::Correct { round } | S::AwaitingRound { round },
                E::RoundAdvanced { round: next },
            ) if next > round => S::AwaitingRound { round: next },
            (S::Eliminated { .. }, E::Reinstated { round }) => S::Correct { round },
            (
                S::AwaitingRound { .. }
                | S::Answering { .. }
                | S::Submitted { .. }
                | S::Correct { .. },
                E::ContestFinished,
            ) => S::Finished,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut RoundMachine, event: RoundEvent) -> RoundState {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_waits_in_lobby() {
        let sm = RoundMachine::new();
        assert_eq!(sm.state(), &RoundState::AwaitingRound { round: 0 });
    }

    #[test]
    fn answering_a_round_correctly_then_advancing() {
        let mut sm = RoundMachine::new();
        let question_id = Uuid::new_v4();

        apply(&mut sm, RoundEvent::RoundAdvanced { round: 1 });
        assert_eq!(
            apply(
                &mut sm,
                RoundEvent::QuestionOpened {
                    round: 1,
                    question_id
                }
            ),
            RoundState::Answering {
                round: 1,
                question_id
            }
        );
        assert_eq!(
            apply(
                &mut sm,
                RoundEvent::AnswerSubmitted {
                    answer: "Touchdown".into()
                }
            ),
            RoundState::Submitted {
                round: 1,
                answer: "Touchdown".into()
            }
        );
        assert_eq!(
            apply(&mut sm, RoundEvent::Judged { correct: true }),
            RoundState::Correct { round: 1 }
        );
        assert_eq!(
            apply(&mut sm, RoundEvent::RoundAdvanced { round: 2 }),
            RoundState::AwaitingRound { round: 2 }
        );
    }

    #[test]
    fn closing_the_window_while_answering_eliminates() {
        let mut sm = RoundMachine::new();
        apply(&mut sm, RoundEvent::RoundAdvanced { round: 1 });
        apply(
            &mut sm,
            RoundEvent::QuestionOpened {
                round: 1,
                question_id: Uuid::new_v4(),
            },
        );
        assert_eq!(
            apply(&mut sm, RoundEvent::WindowClosed),
            RoundState::Eliminated { round: 1 }
        );
    }

    #[test]
    fn reinstatement_returns_to_correct() {
        let mut sm = RoundMachine::new();
        apply(
            &mut sm,
            RoundEvent::Resync(RoundState::Eliminated { round: 2 }),
        );
        assert_eq!(
            apply(&mut sm, RoundEvent::Reinstated { round: 2 }),
            RoundState::Correct { round: 2 }
        );
    }

    #[test]
    fn eliminated_participants_ignore_round_changes() {
        let mut sm = RoundMachine::new();
        apply(
            &mut sm,
            RoundEvent::Resync(RoundState::Eliminated { round: 2 }),
        );

        let err = sm.plan(RoundEvent::RoundAdvanced { round: 3 }).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
        let err = sm.plan(RoundEvent::ContestFinished).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
    }

    #[test]
    fn question_for_another_round_is_rejected() {
        let mut sm = RoundMachine::new();
        apply(&mut sm, RoundEvent::RoundAdvanced { round: 2 });
        let err = sm
            .plan(RoundEvent::QuestionOpened {
                round: 1,
                question_id: Uuid::new_v4(),
            })
            .unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, RoundState::AwaitingRound { round: 2 });
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pending_plan_blocks_a_second_plan() {
        let mut sm = RoundMachine::new();
        let plan = sm.plan(RoundEvent::RoundAdvanced { round: 1 }).unwrap();
        assert_eq!(
            sm.plan(RoundEvent::ContestFinished).unwrap_err(),
            PlanError::AlreadyPending
        );
        assert_eq!(
            sm.snapshot().pending,
            Some(RoundState::AwaitingRound { round: 1 })
        );

        sm.abort(plan.id).unwrap();
        assert!(!sm.has_pending());
        assert_eq!(sm.state(), &RoundState::AwaitingRound { round: 0 });
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan_pending() {
        let mut sm = RoundMachine::new();
        let plan = sm.plan(RoundEvent::RoundAdvanced { round: 1 }).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert!(sm.has_pending());
        assert_eq!(sm.apply(plan.id).unwrap(), RoundState::AwaitingRound { round: 1 });
        assert_eq!(sm.snapshot().version, 1);
    }
}
