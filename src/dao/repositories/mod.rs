//! Typed repositories over a [`ContestStore`], one per table.
//!
//! Every write takes the table's feed gate, commits through the store and only then publishes
//! the change, so subscribers never see an event for a write that failed.

mod answers;
mod contests;
mod participants;
mod questions;

use std::sync::Arc;

pub use self::answers::{AnswerRepository, Tally};
pub use self::contests::{ContestPatch, ContestRepository};
pub use self::participants::{ParticipantFilter, ParticipantRepository};
pub use self::questions::QuestionRepository;

use crate::{
    dao::contest_store::ContestStore,
    state::{
        contest::{Answer, Contest, Participant, Question},
        feed::ChangeFeed,
    },
};

/// Change feeds for the four tables, shared by every repository built on them.
pub struct Feeds {
    /// Contest changes.
    pub contests: Arc<ChangeFeed<Contest>>,
    /// Participant changes.
    pub participants: Arc<ChangeFeed<Participant>>,
    /// Question changes.
    pub questions: Arc<ChangeFeed<Question>>,
    /// Answer changes.
    pub answers: Arc<ChangeFeed<Answer>>,
}

impl Feeds {
    /// Feeds buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            contests: Arc::new(ChangeFeed::new(capacity)),
            participants: Arc::new(ChangeFeed::new(capacity)),
            questions: Arc::new(ChangeFeed::new(capacity)),
            answers: Arc::new(ChangeFeed::new(capacity)),
        }
    }
}

/// The four repositories bound to one store.
#[derive(Clone)]
pub struct Repositories {
    /// Contests.
    pub contests: ContestRepository,
    /// Participants.
    pub participants: ParticipantRepository,
    /// Questions.
    pub questions: QuestionRepository,
    /// Answers.
    pub answers: AnswerRepository,
}

impl Repositories {
    /// Repositories sharing `store` and publishing on `feeds`.
    pub fn new(store: Arc<dyn ContestStore>, feeds: &Feeds) -> Self {
        Self {
            contests: ContestRepository::new(store.clone(), feeds.contests.clone()),
            participants: ParticipantRepository::new(store.clone(), feeds.participants.clone()),
            questions: QuestionRepository::new(store.clone(), feeds.questions.clone()),
            answers: AnswerRepository::new(store, feeds.answers.clone()),
        }
    }
}
