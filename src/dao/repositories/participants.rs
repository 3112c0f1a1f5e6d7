use std::sync::Arc;

use uuid::Uuid;

use crate::{
    dao::{contest_store::ContestStore, storage::StorageResult},
    state::{
        contest::{Participant, ParticipantStatus},
        feed::{ChangeFeed, ChangeKind, Delivery, Subscription},
    },
};

/// Which participants of a contest to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParticipantFilter {
    /// Everybody.
    #[default]
    All,
    /// Still in the running.
    Active,
    /// Eliminated in any round.
    Eliminated,
    /// Eliminated in the given round.
    EliminatedIn(u32),
}

impl ParticipantFilter {
    /// Whether `participant` belongs in the listing.
    pub fn accepts(self, participant: &Participant) -> bool {
        match (self, participant.status) {
            (Self::All, _) => true,
            (Self::Active, status) => status.is_active(),
            (Self::Eliminated, status) => !status.is_active(),
            (Self::EliminatedIn(round), status) => status.elimination_round() == Some(round),
        }
    }
}

/// Participant rows and their change feed.
#[derive(Clone)]
pub struct ParticipantRepository {
    store: Arc<dyn ContestStore>,
    feed: Arc<ChangeFeed<Participant>>,
}

impl ParticipantRepository {
    /// Repository over `store`, publishing on `feed`.
    pub fn new(store: Arc<dyn ContestStore>, feed: Arc<ChangeFeed<Participant>>) -> Self {
        Self { store, feed }
    }

    /// Fetch a participant by id.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<Participant>> {
        self.store
            .find_participant(id)
            .await?
            .map(Participant::try_from)
            .transpose()
    }

    /// Participant row of `user_id` in `contest_id`.
    pub async fn find_by_user(
        &self,
        contest_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<Participant>> {
        self.store
            .find_participant_by_user(contest_id, user_id)
            .await?
            .map(Participant::try_from)
            .transpose()
    }

    /// Participants of a contest in join order.
    pub async fn list(
        &self,
        contest_id: Uuid,
        filter: ParticipantFilter,
    ) -> StorageResult<Vec<Participant>> {
        let mut participants = Vec::new();
        for row in self.store.list_participants(contest_id).await? {
            let participant = Participant::try_from(row)?;
            if filter.accepts(&participant) {
                participants.push(participant);
            }
        }
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(participants)
    }

    /// Insert a participant and publish it; conflicts when the user already joined.
    pub async fn insert(&self, participant: Participant) -> StorageResult<Uuid> {
        let mut writer = self.feed.lock().await;
        self.store
            .insert_participant(participant.clone().into())
            .await?;
        let id = participant.id;
        writer.publish(ChangeKind::Created, participant);
        Ok(id)
    }

    /// Write a new status for `current`, conditional on its version still being stored.
    ///
    /// Both stored columns come from `status`, so `active == false` iff `elimination_round`
    /// is set holds for every row written here.
    pub async fn update_status(
        &self,
        current: &Participant,
        status: ParticipantStatus,
        reinstated_round: Option<u32>,
    ) -> StorageResult<Participant> {
        let mut next = current.clone();
        next.status = status;
        next.reinstated_round = reinstated_round;
        next.version = current.version + 1;

        let mut writer = self.feed.lock().await;
        self.store
            .update_participant(next.clone().into(), current.version)
            .await?;
        writer.publish(ChangeKind::Updated, next.clone());
        Ok(next)
    }

    /// Subscribe to changes of participants matching `filter`.
    pub fn subscribe<F, C>(&self, filter: F, on_change: C) -> Subscription
    where
        F: Fn(&Participant) -> bool + Send + 'static,
        C: FnMut(Delivery<Participant>) + Send + 'static,
    {
        self.feed.subscribe(filter, on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{contest_store::memory::MemoryContestStore, storage::StorageError};

    fn repository() -> ParticipantRepository {
        ParticipantRepository::new(
            Arc::new(MemoryContestStore::new()),
            Arc::new(ChangeFeed::new(16)),
        )
    }

    #[tokio::test]
    async fn elimination_loses_against_a_newer_row() {
        let repo = repository();
        let participant = Participant::new(Uuid::new_v4(), Uuid::new_v4(), "Ada".into());
        repo.insert(participant.clone()).await.unwrap();

        let reinstated = repo
            .update_status(&participant, ParticipantStatus::Active, Some(1))
            .await
            .unwrap();
        assert_eq!(reinstated.version, 1);

        let err = repo
            .update_status(&participant, ParticipantStatus::Eliminated { round: 1 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn list_applies_the_status_filter() {
        let repo = repository();
        let contest_id = Uuid::new_v4();
        let ada = Participant::new(contest_id, Uuid::new_v4(), "Ada".into());
        let mut grace = Participant::new(contest_id, Uuid::new_v4(), "Grace".into());
        grace.status = ParticipantStatus::Eliminated { round: 2 };
        repo.insert(ada.clone()).await.unwrap();
        repo.insert(grace.clone()).await.unwrap();

        let active = repo.list(contest_id, ParticipantFilter::Active).await.unwrap();
        assert_eq!(active, vec![ada]);
        let round_two = repo
            .list(contest_id, ParticipantFilter::EliminatedIn(2))
            .await
            .unwrap();
        assert_eq!(round_two, vec![grace]);
        assert!(
            repo.list(contest_id, ParticipantFilter::EliminatedIn(1))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
