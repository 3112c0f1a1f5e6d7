/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// Process-local backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{AnswerEntity, ContestEntity, ParticipantEntity, QuestionEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for contests and everything they own.
///
/// Conditional updates (`update_contest`, `update_participant`) only write when the stored
/// `version` equals `expected_version` and fail with a conflict otherwise. The caller is
/// responsible for setting the new version on the entity it passes in.
pub trait ContestStore: Send + Sync {
    /// Insert a new contest; conflicts when the id is taken.
    fn insert_contest(&self, contest: ContestEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a contest by id.
    fn find_contest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ContestEntity>>>;
    /// Every contest.
    fn list_contests(&self) -> BoxFuture<'static, StorageResult<Vec<ContestEntity>>>;
    /// Replace a contest if its stored version is `expected_version`.
    fn update_contest(
        &self,
        contest: ContestEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert a participant; conflicts when the user already joined the contest.
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a participant by id.
    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Participant row of `user_id` in a contest.
    fn find_participant_by_user(
        &self,
        contest_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Participants of a contest in join order.
    fn list_participants(
        &self,
        contest_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Replace a participant if its stored version is `expected_version`.
    fn update_participant(
        &self,
        participant: ParticipantEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert or replace a question.
    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a question by id.
    fn find_question(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
    /// Questions of a contest, optionally narrowed to one round.
    fn list_questions(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Delete a question. Returns `false` when it did not exist.
    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Append an answer; conflicts when the participant already answered that round.
    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch an answer by id.
    fn find_answer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<AnswerEntity>>>;
    /// Answers of a contest, optionally narrowed to one round.
    fn list_answers(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;

    /// Cheap round trip proving the backend still answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
