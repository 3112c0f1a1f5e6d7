//! Participant-facing operations: joining, leaving and answering.
//!
//! Every participant that joined gets one running round lifecycle. The lifecycle owns all
//! writes made on the participant's behalf; these helpers only start, stop and talk to it.

use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::storage::StorageError,
    dto::{
        contest::ParticipantSummary,
        participant::{JoinResponse, RoundViewResponse},
    },
    error::ServiceError,
    services::{
        public_service::load_contest,
        round_lifecycle::{self, LifecycleHandle, RoundView},
        session_service::authenticate,
    },
    state::{
        SharedState,
        contest::Participant,
        session::{CurrentUser, SessionContext},
    },
};

/// Join `contest_id` and start the round lifecycle.
///
/// Joining again returns the existing participant, even once the lobby has closed.
pub async fn join_contest(
    state: &SharedState,
    token: &str,
    contest_id: Uuid,
) -> Result<JoinResponse, ServiceError> {
    let (user, session) = authenticate(state, token)?;
    let repos = state.repositories().await?;
    let contest = load_contest(state, contest_id).await?;

    let participant = match repos.participants.find_by_user(contest_id, user.id).await? {
        Some(existing) => existing,
        None => {
            if contest.finished {
                return Err(ServiceError::InvalidState(format!(
                    "contest `{contest_id}` is finished"
                )));
            }
            if !contest.lobby_open {
                return Err(ServiceError::InvalidState(format!(
                    "lobby of contest `{contest_id}` is closed"
                )));
            }
            let participant = Participant::new(contest_id, user.id, user.display_name.clone());
            match repos.participants.insert(participant.clone()).await {
                Ok(_) => {
                    info!(%contest_id, participant_id = %participant.id, "participant joined");
                    participant
                }
                // Lost a race against another join of the same user.
                Err(StorageError::Conflict { .. }) => repos
                    .participants
                    .find_by_user(contest_id, user.id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Conflict(format!(
                            "could not join contest `{contest_id}`; try again"
                        ))
                    })?,
                Err(err) => return Err(err.into()),
            }
        }
    };

    let handle = ensure_lifecycle(state, contest_id, user, session);
    Ok(JoinResponse {
        participant: ParticipantSummary::from(participant),
        round: handle.view().into(),
    })
}

/// Stop the caller's lifecycle in `contest_id`. The participant row stays.
pub async fn leave_contest(
    state: &SharedState,
    token: &str,
    contest_id: Uuid,
) -> Result<(), ServiceError> {
    let (user, _session) = authenticate(state, token)?;
    match state.lifecycles().remove(&(contest_id, user.id)) {
        Some((_, handle)) => {
            handle.stop();
            info!(%contest_id, user_id = %user.id, "participant left");
            Ok(())
        }
        None => Err(ServiceError::NotFound(format!(
            "no running round lifecycle in contest `{contest_id}`"
        ))),
    }
}

/// Current round view of the caller.
pub async fn round_view(
    state: &SharedState,
    token: &str,
    contest_id: Uuid,
) -> Result<RoundViewResponse, ServiceError> {
    let handle = lifecycle_for(state, token, contest_id).await?;
    Ok(handle.view().into())
}

/// Submit `selection` for the current round.
pub async fn submit_answer(
    state: &SharedState,
    token: &str,
    contest_id: Uuid,
    selection: String,
) -> Result<RoundViewResponse, ServiceError> {
    let handle = lifecycle_for(state, token, contest_id).await?;
    let view = handle.submit(selection).await?;
    Ok(view.into())
}

/// Receiver following every round view of the caller.
pub async fn watch_round(
    state: &SharedState,
    token: &str,
    contest_id: Uuid,
) -> Result<watch::Receiver<RoundView>, ServiceError> {
    let handle = lifecycle_for(state, token, contest_id).await?;
    Ok(handle.watch())
}

/// Stop every running lifecycle. Used on shutdown.
pub fn stop_all(state: &SharedState) {
    let count = state.lifecycles().len();
    state.lifecycles().retain(|_, handle| {
        handle.stop();
        false
    });
    info!(count, "round lifecycles stopped");
}

/// The running lifecycle of the caller, restarted if the participant joined before but none
/// runs now (after a leave or a restart).
async fn lifecycle_for(
    state: &SharedState,
    token: &str,
    contest_id: Uuid,
) -> Result<LifecycleHandle, ServiceError> {
    let (user, session) = authenticate(state, token)?;
    if let Some(handle) = state.lifecycles().get(&(contest_id, user.id)) {
        if handle.is_running() {
            return Ok(handle.clone());
        }
    }

    let repos = state.repositories().await?;
    if repos
        .participants
        .find_by_user(contest_id, user.id)
        .await?
        .is_none()
    {
        return Err(ServiceError::NotFound(format!(
            "not a participant of contest `{contest_id}`"
        )));
    }
    Ok(ensure_lifecycle(state, contest_id, user, session))
}

fn ensure_lifecycle(
    state: &SharedState,
    contest_id: Uuid,
    user: CurrentUser,
    session: SessionContext,
) -> LifecycleHandle {
    match state.lifecycles().entry((contest_id, user.id)) {
        Entry::Occupied(entry) if entry.get().is_running() => entry.get().clone(),
        Entry::Occupied(mut entry) => {
            let handle = round_lifecycle::spawn(state.clone(), contest_id, user, session);
            entry.insert(handle.clone());
            handle
        }
        Entry::Vacant(entry) => {
            let handle = round_lifecycle::spawn(state.clone(), contest_id, user, session);
            entry.insert(handle.clone());
            handle
        }
    }
}
