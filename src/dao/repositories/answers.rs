use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::{contest_store::ContestStore, storage::StorageResult},
    state::{
        contest::Answer,
        feed::{ChangeFeed, ChangeKind, Delivery, Subscription},
    },
};

/// Answer counts of one round, over authoritative answers only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    /// Count per option, in option order. Options nobody picked count zero.
    pub counts: IndexMap<String, usize>,
    /// Blank submissions.
    pub blank: usize,
}

impl Tally {
    /// Every counted answer, blanks included.
    pub fn total(&self) -> usize {
        self.counts.values().sum::<usize>() + self.blank
    }
}

/// Insert-only access to answers.
#[derive(Clone)]
pub struct AnswerRepository {
    store: Arc<dyn ContestStore>,
    feed: Arc<ChangeFeed<Answer>>,
}

impl AnswerRepository {
    /// Repository over `store`, publishing on `feed`.
    pub fn new(store: Arc<dyn ContestStore>, feed: Arc<ChangeFeed<Answer>>) -> Self {
        Self { store, feed }
    }

    /// Append an answer. A second answer for the same participant and round conflicts.
    pub async fn insert(&self, answer: Answer) -> StorageResult<Uuid> {
        let mut writer = self.feed.lock().await;
        self.store.insert_answer(answer.clone().into()).await?;
        let id = answer.id;
        writer.publish(ChangeKind::Created, answer);
        Ok(id)
    }

    /// Look up a single answer by id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<Answer>> {
        Ok(self.store.find_answer(id).await?.map(Answer::from))
    }

    /// Every stored answer of the contest, optionally narrowed to one round.
    pub async fn list(&self, contest_id: Uuid, round: Option<u32>) -> StorageResult<Vec<Answer>> {
        Ok(self
            .store
            .list_answers(contest_id, round)
            .await?
            .into_iter()
            .map(Answer::from)
            .collect())
    }

    /// The answer that counts for `participant_id` in `round`.
    pub async fn for_participant(
        &self,
        contest_id: Uuid,
        participant_id: Uuid,
        round: u32,
    ) -> StorageResult<Option<Answer>> {
        let answers = self.list(contest_id, Some(round)).await?;
        Ok(Answer::authoritative(
            answers
                .into_iter()
                .filter(|answer| answer.participant_id == participant_id),
        ))
    }

    /// Count the authoritative answers of `round` per option.
    pub async fn tally(
        &self,
        contest_id: Uuid,
        round: u32,
        options: &[String],
    ) -> StorageResult<Tally> {
        let answers = self.list(contest_id, Some(round)).await?;
        Ok(tally_answers(answers, options))
    }

    /// Call `on_change` for every answer change accepted by `filter`.
    pub fn subscribe<F, C>(&self, filter: F, on_change: C) -> Subscription
    where
        F: Fn(&Answer) -> bool + Send + 'static,
        C: FnMut(Delivery<Answer>) + Send + 'static,
    {
        self.feed.subscribe(filter, on_change)
    }
}

fn tally_answers(answers: Vec<Answer>, options: &[String]) -> Tally {
    let mut latest: HashMap<Uuid, Answer> = HashMap::new();
    for answer in answers {
        match latest.get(&answer.participant_id) {
            Some(kept) if kept.submitted_at >= answer.submitted_at => {}
            _ => {
                latest.insert(answer.participant_id, answer);
            }
        }
    }

    let mut tally = Tally {
        counts: options.iter().map(|option| (option.clone(), 0)).collect(),
        blank: 0,
    };
    for answer in latest.into_values() {
        match answer.answer {
            Some(choice) => *tally.counts.entry(choice).or_insert(0) += 1,
            None => tally.blank += 1,
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::{contest_store::memory::MemoryContestStore, storage::StorageError};

    fn options() -> Vec<String> {
        vec!["Touchdown".into(), "Punt".into(), "Safety".into()]
    }

    #[test]
    fn tally_keeps_option_order_and_latest_answer() {
        let contest = Uuid::new_v4();
        let ada = Uuid::new_v4();
        let grace = Uuid::new_v4();

        let early = Answer::new(contest, ada, 1, Some("Punt".into()));
        let mut late = Answer::new(contest, ada, 1, Some("Touchdown".into()));
        late.submitted_at = early.submitted_at + Duration::from_secs(2);
        let blank = Answer::new(contest, grace, 1, None);

        let tally = tally_answers(vec![late, early, blank], &options());
        let counts: Vec<_> = tally.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(counts, vec![("Touchdown", 1), ("Punt", 0), ("Safety", 0)]);
        assert_eq!(tally.blank, 1);
        assert_eq!(tally.total(), 2);
    }

    #[tokio::test]
    async fn duplicate_answer_is_rejected_and_not_published() {
        let feed = Arc::new(ChangeFeed::new(16));
        let repo = AnswerRepository::new(Arc::new(MemoryContestStore::new()), feed.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = repo.subscribe(|_| true, move |delivery| {
            let _ = tx.send(delivery);
        });

        let contest = Uuid::new_v4();
        let participant = Uuid::new_v4();
        let first_id = repo
            .insert(Answer::new(contest, participant, 1, Some("Punt".into())))
            .await
            .unwrap();
        let err = repo
            .insert(Answer::new(contest, participant, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Delivery::Change(change) if change.sequence == 1));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        let kept = repo
            .for_participant(contest, participant, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.answer.as_deref(), Some("Punt"));
        assert_eq!(kept.id, first_id);
        assert_eq!(repo.get(first_id).await.unwrap(), Some(kept));
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
