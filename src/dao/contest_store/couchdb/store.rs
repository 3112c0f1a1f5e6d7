use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    contest_store::ContestStore,
    models::{AnswerEntity, ContestEntity, ParticipantEntity, QuestionEntity},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        ANSWER_PREFIX, AllDocsResponse, CONTEST_PREFIX, CouchDocument, END_SUFFIX, PARTICIPANT_PREFIX,
        QUESTION_PREFIX, answer_doc_id, answer_prefix, contest_doc_id, contest_of,
        participant_doc_id, participant_prefix, question_doc_id, question_prefix,
    },
};

/// CouchDB-backed [`ContestStore`] speaking the HTTP document API.
#[derive(Clone)]
pub struct CouchContestStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchContestStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config.credentials.map(|credentials| {
            (
                Arc::<str>::from(credentials.username),
                Arc::<str>::from(credentials.password),
            )
        });

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success()
                    || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<CouchDocument<T>>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchDocument<T>>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document. Without `_rev` this is a create that fails if the id exists.
    async fn put_document<T>(&self, document: &CouchDocument<T>) -> CouchResult<()>
    where
        T: Serialize,
    {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::DocumentConflict {
                path: document.id.clone(),
            }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: document.id.clone(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<()> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::DocumentConflict {
                path: doc_id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<CouchDocument<T>>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    /// Replace a document only if its stored version still equals `expected`.
    ///
    /// The `_rev` read alongside the version makes the PUT fail with 409 if anything
    /// slipped in between the read and the write.
    async fn replace_versioned<T>(
        &self,
        doc_id: String,
        body: T,
        expected: u64,
        version_of: fn(&T) -> u64,
    ) -> CouchResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let existing = self
            .get_document::<T>(&doc_id)
            .await?
            .ok_or_else(|| CouchDaoError::DocumentConflict {
                path: doc_id.clone(),
            })?;

        if version_of(&existing.body) != expected {
            return Err(CouchDaoError::VersionMismatch {
                path: doc_id,
                expected,
            });
        }

        let mut document = CouchDocument::new(doc_id, body);
        document.rev = existing.rev;
        self.put_document(&document).await
    }

    async fn find_participant_by_id(&self, id: Uuid) -> CouchResult<Option<ParticipantEntity>> {
        let docs = self
            .list_documents::<ParticipantEntity>(PARTICIPANT_PREFIX)
            .await?;
        Ok(docs
            .into_iter()
            .map(|doc| doc.body)
            .find(|participant| participant.id == id))
    }

    async fn find_question_document(
        &self,
        id: Uuid,
    ) -> CouchResult<Option<CouchDocument<QuestionEntity>>> {
        let docs = self
            .list_documents::<QuestionEntity>(QUESTION_PREFIX)
            .await?;
        Ok(docs.into_iter().find(|doc| doc.body.id == id))
    }

    async fn list_scoped<T>(
        &self,
        prefix: &str,
        scope: &str,
        contest_id: Uuid,
    ) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let docs = self.list_documents::<T>(scope).await?;
        docs.into_iter()
            .map(|doc| {
                if contest_of(&doc.id, prefix)? != contest_id {
                    return Err(CouchDaoError::InvalidDocId {
                        doc_id: doc.id,
                        kind: "listed outside its contest scope",
                    });
                }
                Ok(doc.body)
            })
            .collect()
    }
}

impl ContestStore for CouchContestStore {
    fn insert_contest(&self, contest: ContestEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchDocument::new(contest_doc_id(contest.id), contest);
            store.put_document(&document).await.map_err(Into::into)
        })
    }

    fn find_contest(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ContestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<ContestEntity>(&contest_doc_id(id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn list_contests(&self) -> BoxFuture<'static, StorageResult<Vec<ContestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut contests: Vec<ContestEntity> = store
                .list_documents::<ContestEntity>(CONTEST_PREFIX)
                .await?
                .into_iter()
                .map(|doc| doc.body)
                .collect();
            contests.sort_by_key(|contest| contest.created_at);
            Ok(contests)
        })
    }

    fn update_contest(
        &self,
        contest: ContestEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_versioned(contest_doc_id(contest.id), contest, expected_version, |c| {
                    c.version
                })
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
            let doc_id = participant_doc_id(participant.contest_id, participant.user_id);
            let document = CouchDocument::new(doc_id, participant);
            store.put_document(&document).await.map_err(Into::into)
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_participant_by_id(id).await.map_err(Into::into) })
    }

    fn find_participant_by_user(
        &self,
        contest_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<ParticipantEntity>(&participant_doc_id(contest_id, user_id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn list_participants(
        &self,
        contest_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut participants: Vec<ParticipantEntity> = store
                .list_scoped(
                    PARTICIPANT_PREFIX,
                    &participant_prefix(contest_id),
                    contest_id,
                )
                .await?;
            participants.sort_by_key(|participant| participant.joined_at);
            Ok(participants)
        })
    }

    fn update_participant(
        &self,
        participant: ParticipantEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = participant_doc_id(participant.contest_id, participant.user_id);
            store
                .replace_versioned(doc_id, participant, expected_version, |p| p.version)
                .await
                .map_err(Into::into)
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = question_doc_id(question.contest_id, question.id);
            let mut document = CouchDocument::new(doc_id, question);
            if let Some(existing) = store
                .get_document::<QuestionEntity>(&document.id)
                .await?
            {
                document.rev = existing.rev;
            }
            store.put_document(&document).await.map_err(Into::into)
        })
    }

    fn find_question(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store.find_question_document(id).await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn list_questions(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut questions: Vec<QuestionEntity> = store
                .list_scoped(QUESTION_PREFIX, &question_prefix(contest_id), contest_id)
                .await?;
            questions.retain(|question| round.is_none_or(|r| question.round == r));
            questions.sort_by_key(|question| (question.round, question.created_at));
            Ok(questions)
        })
    }

    fn delete_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(document) = store.find_question_document(id).await? else {
                return Ok(false);
            };
            let Some(rev) = document.rev else {
                return Err(CouchDaoError::InvalidDocId {
                    doc_id: document.id,
                    kind: "listed without a revision",
                }
                .into());
            };
            store.delete_document(&document.id, &rev).await?;
            Ok(true)
        })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = answer_doc_id(answer.contest_id, answer.round, answer.participant_id);
            let document = CouchDocument::new(doc_id, answer);
            store.put_document(&document).await.map_err(Into::into)
        })
    }

    fn find_answer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            // Answer ids are not part of the document key; scan the answer range.
            let docs = store.list_documents::<AnswerEntity>(ANSWER_PREFIX).await?;
            Ok(docs
                .into_iter()
                .map(|doc| doc.body)
                .find(|answer| answer.id == id))
        })
    }

    fn list_answers(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let prefix = answer_prefix(contest_id, round);
            let docs = store.list_documents::<AnswerEntity>(&prefix).await?;
            let mut answers: Vec<AnswerEntity> = docs.into_iter().map(|doc| doc.body).collect();
            answers.sort_by_key(|answer| answer.submitted_at);
            Ok(answers)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
