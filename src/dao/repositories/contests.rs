use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::{
    dao::{
        contest_store::ContestStore,
        storage::StorageResult,
    },
    state::{
        contest::Contest,
        feed::{ChangeFeed, ChangeKind, Delivery, Subscription},
    },
};

/// Partial update of a contest row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContestPatch {
    /// New lobby flag.
    pub lobby_open: Option<bool>,
    /// New submission window flag.
    pub submission_open: Option<bool>,
    /// New current round.
    pub current_round: Option<u32>,
    /// New finished flag.
    pub finished: Option<bool>,
    /// New last closed round.
    pub closed_round: Option<u32>,
}

impl ContestPatch {
    /// Apply to `contest`, returning whether any column changed.
    fn apply(&self, contest: &mut Contest) -> bool {
        let before = contest.clone();
        if let Some(value) = self.lobby_open {
            contest.lobby_open = value;
        }
        if let Some(value) = self.submission_open {
            contest.submission_open = value;
        }
        if let Some(value) = self.current_round {
            contest.current_round = value;
        }
        if let Some(value) = self.finished {
            contest.finished = value;
        }
        if let Some(value) = self.closed_round {
            contest.closed_round = Some(value);
        }
        *contest != before
    }
}

/// Contest rows and their change feed.
#[derive(Clone)]
pub struct ContestRepository {
    store: Arc<dyn ContestStore>,
    feed: Arc<ChangeFeed<Contest>>,
}

impl ContestRepository {
    /// Repository over `store`, publishing on `feed`.
    pub fn new(store: Arc<dyn ContestStore>, feed: Arc<ChangeFeed<Contest>>) -> Self {
        Self { store, feed }
    }

    /// Fetch a contest by id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<Contest>> {
        Ok(self.store.find_contest(id).await?.map(Contest::from))
    }

    /// All contests, most recently created first.
    pub async fn list(&self) -> StorageResult<Vec<Contest>> {
        let mut contests: Vec<Contest> = self
            .store
            .list_contests()
            .await?
            .into_iter()
            .map(Contest::from)
            .collect();
        contests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(contests)
    }

    /// Insert a new contest and publish it.
    pub async fn insert(&self, contest: Contest) -> StorageResult<Uuid> {
        let mut writer = self.feed.lock().await;
        self.store.insert_contest(contest.clone().into()).await?;
        let id = contest.id;
        writer.publish(ChangeKind::Created, contest);
        Ok(id)
    }

    /// Apply `patch` on top of `current`, conditional on `current.version` still being stored.
    ///
    /// A patch that changes nothing is not written and publishes nothing.
    pub async fn update(&self, current: &Contest, patch: &ContestPatch) -> StorageResult<Contest> {
        let mut next = current.clone();
        if !patch.apply(&mut next) {
            return Ok(next);
        }
        next.version = current.version + 1;
        next.updated_at = SystemTime::now();

        let mut writer = self.feed.lock().await;
        self.store
            .update_contest(next.clone().into(), current.version)
            .await?;
        writer.publish(ChangeKind::Updated, next.clone());
        Ok(next)
    }

    /// Subscribe to changes of contests matching `filter`.
    pub fn subscribe<F, C>(&self, filter: F, on_change: C) -> Subscription
    where
        F: Fn(&Contest) -> bool + Send + 'static,
        C: FnMut(Delivery<Contest>) + Send + 'static,
    {
        self.feed.subscribe(filter, on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{contest_store::memory::MemoryContestStore, storage::StorageError};

    fn repository() -> ContestRepository {
        ContestRepository::new(
            Arc::new(MemoryContestStore::new()),
            Arc::new(ChangeFeed::new(16)),
        )
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let repo = repository();
        let contest = Contest::new("Quarter finals".into(), None);
        repo.insert(contest.clone()).await.unwrap();

        let open = ContestPatch {
            lobby_open: Some(true),
            ..ContestPatch::default()
        };
        let updated = repo.update(&contest, &open).await.unwrap();
        assert_eq!(updated.version, 1);

        let close = ContestPatch {
            lobby_open: Some(false),
            ..ContestPatch::default()
        };
        let err = repo.update(&contest, &close).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn no_op_patch_skips_write() {
        let repo = repository();
        let contest = Contest::new("Semis".into(), None);
        repo.insert(contest.clone()).await.unwrap();

        let same = ContestPatch {
            lobby_open: Some(false),
            ..ContestPatch::default()
        };
        let unchanged = repo.update(&contest, &same).await.unwrap();
        assert_eq!(unchanged.version, 0);
        assert_eq!(repo.get(contest.id).await.unwrap().unwrap().version, 0);
    }
}
