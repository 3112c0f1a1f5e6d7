use std::sync::Arc;

use uuid::Uuid;

use crate::{
    dao::{contest_store::ContestStore, storage::StorageResult},
    state::{
        contest::Question,
        feed::{ChangeFeed, ChangeKind, Delivery, Subscription},
    },
};

/// Question rows and their change feed.
#[derive(Clone)]
pub struct QuestionRepository {
    store: Arc<dyn ContestStore>,
    feed: Arc<ChangeFeed<Question>>,
}

impl QuestionRepository {
    /// Repository over `store`, publishing on `feed`.
    pub fn new(store: Arc<dyn ContestStore>, feed: Arc<ChangeFeed<Question>>) -> Self {
        Self { store, feed }
    }

    /// Fetch a question by id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<Question>> {
        Ok(self.store.find_question(id).await?.map(Question::from))
    }

    /// Questions of a contest ordered by round, optionally restricted to one round.
    pub async fn list(
        &self,
        contest_id: Uuid,
        round: Option<u32>,
    ) -> StorageResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .store
            .list_questions(contest_id, round)
            .await?
            .into_iter()
            .map(Question::from)
            .collect();
        questions.sort_by(|a, b| (a.round, a.created_at).cmp(&(b.round, b.created_at)));
        Ok(questions)
    }

    /// The question asked in `round`, if one was created.
    pub async fn for_round(&self, contest_id: Uuid, round: u32) -> StorageResult<Option<Question>> {
        Ok(self.list(contest_id, Some(round)).await?.into_iter().next())
    }

    /// Insert a new question and publish it.
    pub async fn insert(&self, question: Question) -> StorageResult<Uuid> {
        let mut writer = self.feed.lock().await;
        self.store.save_question(question.clone().into()).await?;
        let id = question.id;
        writer.publish(ChangeKind::Created, question);
        Ok(id)
    }

    /// Replace a question and publish the new row.
    pub async fn update(&self, question: Question) -> StorageResult<Question> {
        let mut writer = self.feed.lock().await;
        self.store.save_question(question.clone().into()).await?;
        writer.publish(ChangeKind::Updated, question.clone());
        Ok(question)
    }

    /// Delete `question`, returning whether a row was removed.
    pub async fn delete(&self, question: Question) -> StorageResult<bool> {
        let mut writer = self.feed.lock().await;
        let removed = self.store.delete_question(question.id).await?;
        if removed {
            writer.publish(ChangeKind::Deleted, question);
        }
        Ok(removed)
    }

    /// Call `on_change` for every question change accepted by `filter`.
    pub fn subscribe<F, C>(&self, filter: F, on_change: C) -> Subscription
    where
        F: Fn(&Question) -> bool + Send + 'static,
        C: FnMut(Delivery<Question>) + Send + 'static,
    {
        self.feed.subscribe(filter, on_change)
    }
}
