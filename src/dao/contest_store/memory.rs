//! Process-local store used when no external database is configured, and by the test suite.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashSet;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    contest_store::ContestStore,
    models::{AnswerEntity, ContestEntity, ParticipantEntity, QuestionEntity},
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct Tables {
    contests: IndexMap<Uuid, ContestEntity>,
    participants: IndexMap<Uuid, ParticipantEntity>,
    questions: IndexMap<Uuid, QuestionEntity>,
    answers: IndexMap<Uuid, AnswerEntity>,
}

/// In-memory [`ContestStore`] keeping rows in insertion order.
#[derive(Clone, Default)]
pub struct MemoryContestStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
    broken_participants: Arc<DashSet<Uuid>>,
}

impl MemoryContestStore {
    /// Empty store, online.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StorageError::Unavailable`] while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulate a row the backend cannot write: updates of `participant_id` fail with
    /// [`StorageError::Unavailable`] while every other row keeps working.
    pub fn break_participant(&self, participant_id: Uuid) {
        self.broken_participants.insert(participant_id);
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "in-memory store is offline".into(),
                io::Error::new(io::ErrorKind::NotConnected, "offline"),
            ))
        } else {
            Ok(())
        }
    }
}

fn version_conflict(kind: &str, id: Uuid, expected: u64, actual: u64) -> StorageError {
    StorageError::conflict(format!(
        "{kind} `{id}` was modified concurrently (expected version {expected}, found {actual})"
    ))
}

impl ContestStore for MemoryContestStore {
    fn insert_contest(&self, contest: ContestEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut tables = store.tables.write().await;
            if tables.contests.contains_key(&contest.id) {
                return Err(StorageError::conflict(format!(
                    "contest `{}` already exists",
                    contest.id
                )));
            }
            tables.contests.insert(contest.id, contest);
            Ok(())
        })
    }

    fn find_contest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ContestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.tables.read().await.contests.get(&id).cloned())
        })
    }

    fn list_contests(&self) -> BoxFuture<'static, StorageResult<Vec<ContestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.tables.read().await.contests.values().cloned().collect())
        })
    }

    fn update_contest(
        &self,
        contest: ContestEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut tables = store.tables.write().await;
            let slot = tables.contests.get_mut(&contest.id).ok_or_else(|| {
                StorageError::conflict(format!("contest `{}` no longer exists", contest.id))
            })?;
            if slot.version != expected_version {
                return Err(version_conflict(
                    "contest",
                    contest.id,
                    expected_version,
                    slot.version,
                ));
            }
            *slot = contest;
            Ok(())
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut tables = store.tables.write().await;
            let duplicate = tables.participants.values().any(|existing| {
                existing.contest_id == participant.contest_id
                    && existing.user_id == participant.user_id
            });
            if duplicate {
                return Err(StorageError::conflict(format!(
                    "user `{}` already joined contest `{}`",
                    participant.user_id, participant.contest_id
                )));
            }
            tables.participants.insert(participant.id, participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.tables.read().await.participants.get(&id).cloned())
        })
    }

    fn find_participant_by_user(
        &self,
        contest_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .tables
                .read()
                .await
                .participants
                .values()
                .find(|p| p.contest_id == contest_id && p.user_id == user_id)
                .cloned())
        })
    }

    fn list_participants(
        &self,
        contest_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .tables
                .read()
                .await
                .participants
                .values()
                .filter(|p| p.contest_id == contest_id)
                .cloned()
                .collect())
        })
    }

    fn update_participant(
        &self,
        participant: ParticipantEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            if store.broken_participants.contains(&participant.id) {
                return Err(StorageError::unavailable(
                    format!("participant `{}` cannot be written", participant.id),
                    io::Error::other("write refused"),
                ));
            }
            let mut tables = store.tables.write().await;
            let slot = tables.participants.get_mut(&participant.id).ok_or_else(|| {
                StorageError::conflict(format!(
                    "participant `{}` no longer exists",
                    participant.id
                ))
            })?;
            if slot.version != expected_version {
                return Err(version_conflict(
                    "participant",
                    participant.id,
                    expected_version,
                    slot.version,
                ));
            }
            *slot = participant;
            Ok(())
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store
                .tables
                .write()
                .await
                .questions
                .insert(question.id, question);
            Ok(())
        })
    }

    fn find_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.tables.read().await.questions.get(&id).cloned())
        })
    }

    fn list_questions(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .tables
                .read()
                .await
                .questions
                .values()
                .filter(|q| q.contest_id == contest_id)
                .filter(|q| round.is_none_or(|r| q.round == r))
                .cloned()
                .collect())
        })
    }

    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .tables
                .write()
                .await
                .questions
                .shift_remove(&id)
                .is_some())
        })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut tables = store.tables.write().await;
            let duplicate = tables.answers.values().any(|existing| {
                existing.participant_id == answer.participant_id && existing.round == answer.round
            });
            if duplicate {
                return Err(StorageError::conflict(format!(
                    "participant `{}` already answered round {}",
                    answer.participant_id, answer.round
                )));
            }
            tables.answers.insert(answer.id, answer);
            Ok(())
        })
    }

    fn find_answer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.tables.read().await.answers.get(&id).cloned())
        })
    }

    fn list_answers(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .tables
                .read()
                .await
                .answers
                .values()
                .filter(|a| a.contest_id == contest_id)
                .filter(|a| round.is_none_or(|r| a.round == r))
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn answer(participant_id: Uuid, round: u32, value: Option<&str>) -> AnswerEntity {
        AnswerEntity {
            id: Uuid::new_v4(),
            contest_id: Uuid::nil(),
            participant_id,
            round,
            answer: value.map(str::to_owned),
            submitted_at: SystemTime::now(),
        }
    }

    fn participant(contest_id: Uuid, user_id: Uuid) -> ParticipantEntity {
        ParticipantEntity {
            id: Uuid::new_v4(),
            contest_id,
            user_id,
            display_name: "Sam".into(),
            active: true,
            elimination_round: None,
            reinstated_round: None,
            version: 0,
            joined_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn second_answer_for_same_round_conflicts() {
        let store = MemoryContestStore::new();
        let participant_id = Uuid::new_v4();

        store
            .insert_answer(answer(participant_id, 1, Some("Punt")))
            .await
            .unwrap();
        let err = store
            .insert_answer(answer(participant_id, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        store
            .insert_answer(answer(participant_id, 2, None))
            .await
            .unwrap();
        assert_eq!(
            store.list_answers(Uuid::nil(), Some(1)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn stale_participant_version_is_rejected() {
        let store = MemoryContestStore::new();
        let mut row = participant(Uuid::new_v4(), Uuid::new_v4());
        store.insert_participant(row.clone()).await.unwrap();

        row.active = false;
        row.elimination_round = Some(1);
        row.version = 1;
        store.update_participant(row.clone(), 0).await.unwrap();

        let err = store.update_participant(row, 0).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn user_cannot_join_twice() {
        let store = MemoryContestStore::new();
        let contest_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        store
            .insert_participant(participant(contest_id, user_id))
            .await
            .unwrap();
        let err = store
            .insert_participant(participant(contest_id, user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryContestStore::new();
        store.set_offline(true);
        let err = store.list_contests().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
