use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoAnswerDocument, MongoContestDocument, MongoParticipantDocument,
        MongoQuestionDocument, doc_id, doc_id_at_version, uuid_bson,
    },
};
use crate::dao::{
    contest_store::ContestStore,
    models::{AnswerEntity, ContestEntity, ParticipantEntity, QuestionEntity},
    storage::StorageResult,
};

const CONTESTS: &str = "contests";
const PARTICIPANTS: &str = "participants";
const QUESTIONS: &str = "questions";
const ANSWERS: &str = "answers";

/// MongoDB-backed [`ContestStore`].
#[derive(Clone)]
pub struct MongoContestStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn round_filter(contest_id: Uuid, round: Option<u32>) -> Document {
    let mut filter = doc! { "contest_id": uuid_bson(contest_id) };
    if let Some(round) = round {
        filter.insert("round", round as i64);
    }
    filter
}

impl MongoContestStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let indexes: [(&'static str, &'static str, Document, bool); 4] = [
            (
                PARTICIPANTS,
                "contest_id,user_id",
                doc! { "contest_id": 1, "user_id": 1 },
                true,
            ),
            (
                ANSWERS,
                "participant_id,round",
                doc! { "participant_id": 1, "round": 1 },
                true,
            ),
            (
                ANSWERS,
                "contest_id,round",
                doc! { "contest_id": 1, "round": 1 },
                false,
            ),
            (
                QUESTIONS,
                "contest_id,round",
                doc! { "contest_id": 1, "round": 1 },
                false,
            ),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{}_idx", index.replace(',', "_"))))
                        .unique(Some(unique))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn insert_contest(&self, contest: ContestEntity) -> MongoResult<()> {
        let id = contest.id;
        let document: MongoContestDocument = contest.into();
        self.collection::<MongoContestDocument>(CONTESTS)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| insert_error(CONTESTS, id, source))?;
        Ok(())
    }

    async fn find_contest(&self, id: Uuid) -> MongoResult<Option<ContestEntity>> {
        let document = self
            .collection::<MongoContestDocument>(CONTESTS)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: CONTESTS,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_contests(&self) -> MongoResult<Vec<ContestEntity>> {
        let documents: Vec<MongoContestDocument> = self
            .collection::<MongoContestDocument>(CONTESTS)
            .await
            .find(doc! {})
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: CONTESTS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: CONTESTS,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn update_contest(&self, contest: ContestEntity, expected: u64) -> MongoResult<()> {
        let id = contest.id;
        let document: MongoContestDocument = contest.into();
        let result = self
            .collection::<MongoContestDocument>(CONTESTS)
            .await
            .replace_one(doc_id_at_version(id, expected), &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: CONTESTS,
                id,
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionMismatch {
                collection: CONTESTS,
                id,
                expected,
            });
        }
        Ok(())
    }

    async fn insert_participant(&self, participant: ParticipantEntity) -> MongoResult<()> {
        let id = participant.id;
        let document: MongoParticipantDocument = participant.into();
        self.collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| insert_error(PARTICIPANTS, id, source))?;
        Ok(())
    }

    async fn find_participant_where(
        &self,
        filter: Document,
    ) -> MongoResult<Option<ParticipantEntity>> {
        let document = self
            .collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_participants(&self, contest_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .find(doc! { "contest_id": uuid_bson(contest_id) })
            .sort(doc! { "joined_at": 1 })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: PARTICIPANTS,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn update_participant(
        &self,
        participant: ParticipantEntity,
        expected: u64,
    ) -> MongoResult<()> {
        let id = participant.id;
        let document: MongoParticipantDocument = participant.into();
        let result = self
            .collection::<MongoParticipantDocument>(PARTICIPANTS)
            .await
            .replace_one(doc_id_at_version(id, expected), &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PARTICIPANTS,
                id,
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionMismatch {
                collection: PARTICIPANTS,
                id,
                expected,
            });
        }
        Ok(())
    }

    async fn save_question(&self, question: QuestionEntity) -> MongoResult<()> {
        let id = question.id;
        let document: MongoQuestionDocument = question.into();
        self.collection::<MongoQuestionDocument>(QUESTIONS)
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: QUESTIONS,
                id,
                source,
            })?;
        Ok(())
    }

    async fn find_question(&self, id: Uuid) -> MongoResult<Option<QuestionEntity>> {
        let document = self
            .collection::<MongoQuestionDocument>(QUESTIONS)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUESTIONS,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_questions(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> MongoResult<Vec<QuestionEntity>> {
        let documents: Vec<MongoQuestionDocument> = self
            .collection::<MongoQuestionDocument>(QUESTIONS)
            .await
            .find(round_filter(contest_id, round))
            .sort(doc! { "round": 1, "created_at": 1 })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUESTIONS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUESTIONS,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_question(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .collection::<MongoQuestionDocument>(QUESTIONS)
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: QUESTIONS,
                id,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn insert_answer(&self, answer: AnswerEntity) -> MongoResult<()> {
        let id = answer.id;
        let document: MongoAnswerDocument = answer.into();
        self.collection::<MongoAnswerDocument>(ANSWERS)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| insert_error(ANSWERS, id, source))?;
        Ok(())
    }

    async fn find_answer(&self, id: Uuid) -> MongoResult<Option<AnswerEntity>> {
        let document = self
            .collection::<MongoAnswerDocument>(ANSWERS)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ANSWERS,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_answers(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> MongoResult<Vec<AnswerEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .collection::<MongoAnswerDocument>(ANSWERS)
            .await
            .find(round_filter(contest_id, round))
            .sort(doc! { "submitted_at": 1 })
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ANSWERS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ANSWERS,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }
}

fn insert_error(
    collection: &'static str,
    id: Uuid,
    source: mongodb::error::Error,
) -> MongoDaoError {
    if is_duplicate_key(&source) {
        MongoDaoError::DuplicateKey { collection, id }
    } else {
        MongoDaoError::Write {
            collection,
            id,
            source,
        }
    }
}

impl ContestStore for MongoContestStore {
    fn insert_contest(&self, contest: ContestEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_contest(contest).await.map_err(Into::into) })
    }

    fn find_contest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ContestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_contest(id).await.map_err(Into::into) })
    }

    fn list_contests(&self) -> BoxFuture<'static, StorageResult<Vec<ContestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_contests().await.map_err(Into::into) })
    }

    fn update_contest(
        &self,
        contest: ContestEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_contest(contest, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_participant(participant)
                .await
                .map_err(Into::into)
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participant_where(doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_participant_by_user(
        &self,
        contest_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participant_where(doc! {
                    "contest_id": uuid_bson(contest_id),
                    "user_id": uuid_bson(user_id),
                })
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        contest_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(contest_id).await.map_err(Into::into) })
    }

    fn update_participant(
        &self,
        participant: ParticipantEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_participant(participant, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_question(question).await.map_err(Into::into) })
    }

    fn find_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_question(id).await.map_err(Into::into) })
    }

    fn list_questions(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_questions(contest_id, round)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_question(id).await.map_err(Into::into) })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_answer(answer).await.map_err(Into::into) })
    }

    fn find_answer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_answer(id).await.map_err(Into::into) })
    }

    fn list_answers(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_answers(contest_id, round)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
