//! Read-only projections of contests for participants and spectators.

use uuid::Uuid;

use crate::{
    dao::repositories::ParticipantFilter,
    dto::contest::{ContestSummary, ParticipantSummary},
    error::ServiceError,
    state::{SharedState, contest::Contest},
};

/// Load a contest or fail with `NotFound`.
pub(crate) async fn load_contest(
    state: &SharedState,
    contest_id: Uuid,
) -> Result<Contest, ServiceError> {
    state
        .repositories()
        .await?
        .contests
        .get(contest_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("contest `{contest_id}` not found")))
}

/// Every contest, newest first.
pub async fn list_contests(state: &SharedState) -> Result<Vec<ContestSummary>, ServiceError> {
    let contests = state.repositories().await?.contests.list().await?;
    Ok(contests.into_iter().map(ContestSummary::from).collect())
}

/// Fetch one contest.
pub async fn get_contest(
    state: &SharedState,
    contest_id: Uuid,
) -> Result<ContestSummary, ServiceError> {
    load_contest(state, contest_id).await.map(Into::into)
}

/// Everyone who joined `contest_id`, in join order.
pub async fn list_participants(
    state: &SharedState,
    contest_id: Uuid,
) -> Result<Vec<ParticipantSummary>, ServiceError> {
    let repos = state.repositories().await?;
    load_contest(state, contest_id).await?;
    let participants = repos
        .participants
        .list(contest_id, ParticipantFilter::All)
        .await?;
    Ok(participants
        .into_iter()
        .map(ParticipantSummary::from)
        .collect())
}
