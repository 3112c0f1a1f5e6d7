//! Business logic powering the admin REST routes.
//!
//! Contest writes re-check their preconditions against the row they are about to replace and
//! reload on a version conflict, so two admins racing on the same contest never apply a change
//! that was only valid against a stale snapshot.

use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        repositories::{ContestPatch, ParticipantFilter, Repositories},
        storage::StorageError,
    },
    dto::{
        admin::{CreateContestRequest, QuestionRequest, ReinstateResponse, TallyResponse},
        contest::{ContestSummary, ParticipantSummary, QuestionSummary},
    },
    error::ServiceError,
    services::public_service::load_contest,
    state::{
        SharedState,
        contest::{Contest, Participant, ParticipantStatus, Question, RoundWindow},
    },
};

/// Reloads allowed when a concurrent write bumped the row version first.
const MAX_WRITE_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// Contests
// ---------------------------------------------------------------------------

/// Create a contest in the lobby.
pub async fn create_contest(
    state: &SharedState,
    request: CreateContestRequest,
) -> Result<ContestSummary, ServiceError> {
    let repos = state.repositories().await?;
    let contest = Contest::new(request.name.trim().to_string(), request.starts_at());
    repos.contests.insert(contest.clone()).await?;
    info!(contest_id = %contest.id, name = %contest.name, "contest created");
    Ok(contest.into())
}

/// Every contest, newest first.
pub async fn list_contests(state: &SharedState) -> Result<Vec<ContestSummary>, ServiceError> {
    crate::services::public_service::list_contests(state).await
}

/// Fetch one contest.
pub async fn get_contest(
    state: &SharedState,
    contest_id: Uuid,
) -> Result<ContestSummary, ServiceError> {
    load_contest(state, contest_id).await.map(Into::into)
}

/// Open or close the lobby. Opening is rejected once the contest is finished.
pub async fn set_lobby_open(
    state: &SharedState,
    contest_id: Uuid,
    open: bool,
) -> Result<ContestSummary, ServiceError> {
    let contest = modify_contest(state, contest_id, |contest| {
        if open {
            ensure_not_finished(contest)?;
        }
        Ok(ContestPatch {
            lobby_open: Some(open),
            ..ContestPatch::default()
        })
    })
    .await?;
    info!(%contest_id, open, "lobby toggled");
    Ok(contest.into())
}

/// Open or close the submission window of the current round.
///
/// Closing records the round in `closed_round`; a closed round cannot be reopened.
pub async fn set_submission_open(
    state: &SharedState,
    contest_id: Uuid,
    open: bool,
) -> Result<ContestSummary, ServiceError> {
    let contest = modify_contest(state, contest_id, |contest| {
        if open {
            open_window_patch(contest)
        } else {
            Ok(close_window_patch(contest))
        }
    })
    .await?;
    info!(
        %contest_id,
        round = contest.current_round,
        open,
        "submission window toggled"
    );
    Ok(contest.into())
}

fn open_window_patch(contest: &Contest) -> Result<ContestPatch, ServiceError> {
    ensure_not_finished(contest)?;
    match contest.window() {
        RoundWindow::Open => Ok(ContestPatch::default()),
        RoundWindow::Closed => Err(ServiceError::InvalidState(format!(
            "round {} was already closed",
            contest.current_round
        ))),
        RoundWindow::NotOpened if contest.current_round == 0 => Err(ServiceError::InvalidState(
            "no round has started yet".into(),
        )),
        RoundWindow::NotOpened => Ok(ContestPatch {
            submission_open: Some(true),
            ..ContestPatch::default()
        }),
    }
}

fn close_window_patch(contest: &Contest) -> ContestPatch {
    if contest.submission_open {
        ContestPatch {
            submission_open: Some(false),
            closed_round: Some(contest.current_round),
            ..ContestPatch::default()
        }
    } else {
        ContestPatch::default()
    }
}

/// Move the contest to `round`. Moving forward closes the current window; going back is
/// rejected.
pub async fn set_round(
    state: &SharedState,
    contest_id: Uuid,
    round: u32,
) -> Result<ContestSummary, ServiceError> {
    let contest = modify_contest(state, contest_id, |contest| {
        ensure_not_finished(contest)?;
        if round < contest.current_round {
            return Err(ServiceError::InvalidState(format!(
                "round cannot go back from {} to {round}",
                contest.current_round
            )));
        }
        if round == contest.current_round {
            return Ok(ContestPatch::default());
        }
        Ok(ContestPatch {
            current_round: Some(round),
            ..close_window_patch(contest)
        })
    })
    .await?;
    info!(%contest_id, round, "round advanced");
    Ok(contest.into())
}

/// Finish the contest, closing the lobby and the submission window.
pub async fn finish_contest(
    state: &SharedState,
    contest_id: Uuid,
) -> Result<ContestSummary, ServiceError> {
    let contest = modify_contest(state, contest_id, |contest| {
        if contest.finished {
            return Ok(ContestPatch::default());
        }
        Ok(ContestPatch {
            finished: Some(true),
            lobby_open: Some(false),
            ..close_window_patch(contest)
        })
    })
    .await?;
    info!(%contest_id, round = contest.current_round, "contest finished");
    Ok(contest.into())
}

fn ensure_not_finished(contest: &Contest) -> Result<(), ServiceError> {
    if contest.finished {
        Err(ServiceError::InvalidState(format!(
            "contest `{}` is finished",
            contest.id
        )))
    } else {
        Ok(())
    }
}

/// Reload the contest, derive a patch from it and write it conditionally.
async fn modify_contest<F>(
    state: &SharedState,
    contest_id: Uuid,
    mut decide: F,
) -> Result<Contest, ServiceError>
where
    F: FnMut(&Contest) -> Result<ContestPatch, ServiceError>,
{
    let repos = state.repositories().await?;
    let mut attempt = 1;
    loop {
        let current = repos
            .contests
            .get(contest_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("contest `{contest_id}` not found")))?;
        let patch = decide(&current)?;

        match repos.contests.update(&current, &patch).await {
            Ok(updated) => return Ok(updated),
            Err(StorageError::Conflict { message }) if attempt < MAX_WRITE_ATTEMPTS => {
                debug!(%contest_id, attempt, %message, "contest changed concurrently; reloading");
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Questions
// ---------------------------------------------------------------------------

/// Questions of a contest, optionally narrowed to one round.
pub async fn list_questions(
    state: &SharedState,
    contest_id: Uuid,
    round: Option<u32>,
) -> Result<Vec<QuestionSummary>, ServiceError> {
    let repos = state.repositories().await?;
    load_contest(state, contest_id).await?;
    let questions = repos.questions.list(contest_id, round).await?;
    Ok(questions.into_iter().map(QuestionSummary::from).collect())
}

/// Create the question of `request.round`. Each round has at most one question, and a round
/// that is behind the contest or whose window already closed cannot get one.
pub async fn create_question(
    state: &SharedState,
    contest_id: Uuid,
    request: QuestionRequest,
) -> Result<QuestionSummary, ServiceError> {
    let repos = state.repositories().await?;
    let contest = load_contest(state, contest_id).await?;
    ensure_round_not_over(&contest, request.round)?;
    ensure_round_free(&repos, contest_id, request.round, None).await?;

    let question = Question::new(
        contest_id,
        request.round,
        request.text.trim().to_string(),
        request.options,
        request.correct_option,
    );
    repos.questions.insert(question.clone()).await?;
    info!(%contest_id, question_id = %question.id, round = question.round, "question created");
    Ok(question.into())
}

/// Replace a question. Once answers exist for its round only a missing correct option may be
/// filled in.
pub async fn update_question(
    state: &SharedState,
    question_id: Uuid,
    request: QuestionRequest,
) -> Result<QuestionSummary, ServiceError> {
    let repos = state.repositories().await?;
    let current = load_question(&repos, question_id).await?;
    if request.round != current.round {
        let contest = load_contest(state, current.contest_id).await?;
        ensure_round_not_over(&contest, request.round)?;
        ensure_round_free(&repos, current.contest_id, request.round, Some(current.id)).await?;
    }

    let text = request.text.trim().to_string();
    if has_answers(&repos, &current).await? {
        if text != current.text || request.options != current.options {
            return Err(frozen(&current, "its text and options cannot change"));
        }
        if request.round != current.round {
            return Err(frozen(&current, "it cannot move to another round"));
        }
        if current.correct_option.is_some() && request.correct_option != current.correct_option {
            return Err(frozen(&current, "its correct option cannot change"));
        }
    }

    let unchanged = request.round == current.round
        && text == current.text
        && request.options == current.options
        && request.correct_option == current.correct_option;
    if unchanged {
        return Ok(current.into());
    }

    let question = repos
        .questions
        .update(Question {
            round: request.round,
            text,
            options: request.options,
            correct_option: request.correct_option,
            updated_at: SystemTime::now(),
            ..current
        })
        .await?;
    info!(question_id = %question.id, round = question.round, "question updated");
    Ok(question.into())
}

/// Delete a question that nobody answered yet.
pub async fn delete_question(state: &SharedState, question_id: Uuid) -> Result<(), ServiceError> {
    let repos = state.repositories().await?;
    let question = load_question(&repos, question_id).await?;
    if has_answers(&repos, &question).await? {
        return Err(frozen(&question, "it cannot be deleted"));
    }
    if !repos.questions.delete(question.clone()).await? {
        return Err(ServiceError::NotFound(format!(
            "question `{question_id}` not found"
        )));
    }
    info!(
        contest_id = %question.contest_id,
        %question_id,
        round = question.round,
        "question deleted"
    );
    Ok(())
}

/// Publish the correct option. Participants of the round are judged as soon as it lands.
pub async fn set_correct_option(
    state: &SharedState,
    question_id: Uuid,
    option: String,
) -> Result<QuestionSummary, ServiceError> {
    let repos = state.repositories().await?;
    let current = load_question(&repos, question_id).await?;
    if !current.has_option(&option) {
        return Err(ServiceError::Validation(format!(
            "`{option}` is not one of the options of question `{question_id}`"
        )));
    }

    match current.correct_option.as_deref() {
        Some(existing) if existing == option => return Ok(current.into()),
        Some(_) if has_answers(&repos, &current).await? => {
            return Err(frozen(&current, "its correct option cannot change"));
        }
        _ => {}
    }

    let question = repos
        .questions
        .update(Question {
            correct_option: Some(option),
            updated_at: SystemTime::now(),
            ..current
        })
        .await?;
    info!(
        contest_id = %question.contest_id,
        %question_id,
        round = question.round,
        "correct option published"
    );
    Ok(question.into())
}

async fn load_question(repos: &Repositories, question_id: Uuid) -> Result<Question, ServiceError> {
    repos
        .questions
        .get(question_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))
}

/// Rounds behind the contest, and the current round once its window closed, are over: a
/// question landing there would judge participants on a window they never saw.
fn ensure_round_not_over(contest: &Contest, round: u32) -> Result<(), ServiceError> {
    let past = round < contest.current_round;
    let closed = round == contest.current_round && contest.window() == RoundWindow::Closed;
    if past || closed {
        return Err(ServiceError::InvalidState(format!(
            "round {round} of contest `{}` is already over",
            contest.id
        )));
    }
    Ok(())
}

async fn ensure_round_free(
    repos: &Repositories,
    contest_id: Uuid,
    round: u32,
    except: Option<Uuid>,
) -> Result<(), ServiceError> {
    match repos.questions.for_round(contest_id, round).await? {
        Some(existing) if Some(existing.id) != except => Err(ServiceError::Conflict(format!(
            "round {round} already has question `{}`",
            existing.id
        ))),
        _ => Ok(()),
    }
}

async fn has_answers(repos: &Repositories, question: &Question) -> Result<bool, ServiceError> {
    let answers = repos
        .answers
        .list(question.contest_id, Some(question.round))
        .await?;
    Ok(!answers.is_empty())
}

fn frozen(question: &Question, what: &str) -> ServiceError {
    ServiceError::InvalidState(format!(
        "round {} already has answers; {what}",
        question.round
    ))
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// Participants of a contest matching `filter`.
pub async fn list_participants(
    state: &SharedState,
    contest_id: Uuid,
    filter: ParticipantFilter,
) -> Result<Vec<ParticipantSummary>, ServiceError> {
    let repos = state.repositories().await?;
    load_contest(state, contest_id).await?;
    let participants = repos.participants.list(contest_id, filter).await?;
    Ok(participants
        .into_iter()
        .map(ParticipantSummary::from)
        .collect())
}

/// Put every participant eliminated in `round` back in the running.
///
/// Best effort: one failed row does not stop the batch and nothing is rolled back. When some
/// rows failed the error carries both counts.
pub async fn reinstate_participants(
    state: &SharedState,
    contest_id: Uuid,
    round: u32,
) -> Result<ReinstateResponse, ServiceError> {
    let repos = state.repositories().await?;
    let contest = load_contest(state, contest_id).await?;
    let eliminated = repos
        .participants
        .list(contest_id, ParticipantFilter::EliminatedIn(round))
        .await?;
    let intended = eliminated.len();

    let mut reinstated = 0;
    let mut first_error = None;
    for participant in eliminated {
        let participant_id = participant.id;
        match reinstate_one(&repos, participant, round, &contest).await {
            Ok(true) => reinstated += 1,
            Ok(false) => debug!(
                %contest_id,
                %participant_id,
                round,
                "participant no longer eliminated in round"
            ),
            Err(err) => {
                warn!(%contest_id, %participant_id, round, error = %err, "reinstatement failed");
                first_error.get_or_insert(err);
            }
        }
    }

    info!(%contest_id, round, intended, reinstated, "participants reinstated");
    match first_error {
        Some(err) => Err(ServiceError::PartialFailure {
            succeeded: reinstated,
            intended,
            message: err.to_string(),
        }),
        None => Ok(ReinstateResponse {
            round,
            intended,
            reinstated,
        }),
    }
}

/// Reinstate one participant, reloading if the row moved underneath us. Returns `false` when
/// the participant is no longer eliminated in `round`.
async fn reinstate_one(
    repos: &Repositories,
    mut participant: Participant,
    round: u32,
    contest: &Contest,
) -> Result<bool, ServiceError> {
    let mut attempt = 1;
    loop {
        if participant.status != (ParticipantStatus::Eliminated { round }) {
            return Ok(false);
        }
        let settled = settled_round(repos, &participant, contest).await?;
        match repos
            .participants
            .update_status(&participant, ParticipantStatus::Active, settled)
            .await
        {
            Ok(_) => return Ok(true),
            Err(StorageError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                attempt += 1;
                participant = repos.participants.get(participant.id).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("participant `{}` not found", participant.id))
                })?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// The current round, when its outcome for `participant` can no longer change: the window is
/// closed or the participant already answered. Only that outcome is waived by the
/// reinstatement; a round that is still undecided is judged normally.
async fn settled_round(
    repos: &Repositories,
    participant: &Participant,
    contest: &Contest,
) -> Result<Option<u32>, ServiceError> {
    let round = contest.current_round;
    if round == 0 {
        return Ok(None);
    }
    if contest.window() == RoundWindow::Closed {
        return Ok(Some(round));
    }
    let answered = repos
        .answers
        .for_participant(contest.id, participant.id, round)
        .await?
        .is_some();
    Ok(answered.then_some(round))
}

/// Answer counts of `round`, in option order.
pub async fn tally(
    state: &SharedState,
    contest_id: Uuid,
    round: u32,
) -> Result<TallyResponse, ServiceError> {
    let repos = state.repositories().await?;
    load_contest(state, contest_id).await?;
    let options = repos
        .questions
        .for_round(contest_id, round)
        .await?
        .map(|question| question.options)
        .unwrap_or_default();
    let tally = repos.answers.tally(contest_id, round, &options).await?;
    Ok(TallyResponse::new(round, tally))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::contest_store::memory::MemoryContestStore,
        dto::contest::WindowDto,
        state::{AppState, contest::Answer},
    };

    async fn setup() -> (SharedState, Repositories, Uuid) {
        let (state, repos, id, _store) = setup_with_store().await;
        (state, repos, id)
    }

    async fn setup_with_store() -> (SharedState, Repositories, Uuid, MemoryContestStore) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryContestStore::new();
        state.set_store(Arc::new(store.clone())).await;
        let repos = state.repositories().await.unwrap();
        let contest = create_contest(
            &state,
            CreateContestRequest {
                name: "  Gridiron  ".into(),
                starts_at: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(contest.name, "Gridiron");
        (state, repos, contest.id, store)
    }

    fn touchdown_question(round: u32) -> QuestionRequest {
        QuestionRequest {
            round,
            text: "Worth six points?".into(),
            options: vec!["Touchdown".into(), "Punt".into()],
            correct_option: None,
        }
    }

    async fn join(repos: &Repositories, contest_id: Uuid, name: &str) -> Participant {
        let participant = Participant::new(contest_id, Uuid::new_v4(), name.into());
        repos.participants.insert(participant.clone()).await.unwrap();
        participant
    }

    async fn eliminate(repos: &Repositories, participant: &Participant, round: u32) {
        let current = repos.participants.get(participant.id).await.unwrap().unwrap();
        repos
            .participants
            .update_status(&current, ParticipantStatus::Eliminated { round }, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn round_moves_forward_only_and_closes_the_window() {
        let (state, _repos, id) = setup().await;
        set_round(&state, id, 1).await.unwrap();
        let open = set_submission_open(&state, id, true).await.unwrap();
        assert!(matches!(open.window, WindowDto::Open));

        let next = set_round(&state, id, 2).await.unwrap();
        assert!(!next.submission_open);
        assert_eq!(next.closed_round, Some(1));
        assert!(matches!(next.window, WindowDto::NotOpened));

        let err = set_round(&state, id, 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let same = set_round(&state, id, 2).await.unwrap();
        assert_eq!(same.updated_at, next.updated_at);
    }

    #[tokio::test]
    async fn closed_round_cannot_be_reopened() {
        let (state, _repos, id) = setup().await;
        let err = set_submission_open(&state, id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        set_round(&state, id, 1).await.unwrap();
        set_submission_open(&state, id, true).await.unwrap();
        let closed = set_submission_open(&state, id, false).await.unwrap();
        assert_eq!(closed.closed_round, Some(1));
        assert!(matches!(closed.window, WindowDto::Closed));

        // Closing twice is a no-op.
        let again = set_submission_open(&state, id, false).await.unwrap();
        assert_eq!(again.updated_at, closed.updated_at);

        let err = set_submission_open(&state, id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn finishing_closes_lobby_and_window() {
        let (state, _repos, id) = setup().await;
        set_lobby_open(&state, id, true).await.unwrap();
        set_round(&state, id, 1).await.unwrap();
        set_submission_open(&state, id, true).await.unwrap();

        let finished = finish_contest(&state, id).await.unwrap();
        assert!(finished.finished);
        assert!(!finished.lobby_open);
        assert!(!finished.submission_open);
        assert_eq!(finished.closed_round, Some(1));

        let err = set_lobby_open(&state, id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(set_lobby_open(&state, id, false).await.is_ok());
    }

    #[tokio::test]
    async fn each_round_has_one_question() {
        let (state, _repos, id) = setup().await;
        let first = create_question(&state, id, touchdown_question(1))
            .await
            .unwrap();
        let err = create_question(&state, id, touchdown_question(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let second = create_question(&state, id, touchdown_question(2))
            .await
            .unwrap();
        let err = update_question(&state, second.id, touchdown_question(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let moved = update_question(&state, first.id, touchdown_question(3))
            .await
            .unwrap();
        assert_eq!(moved.round, 3);
        assert_eq!(list_questions(&state, id, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn answered_question_is_frozen() {
        let (state, repos, id) = setup().await;
        let question = create_question(&state, id, touchdown_question(1))
            .await
            .unwrap();
        let ada = join(&repos, id, "Ada").await;
        repos
            .answers
            .insert(Answer::new(id, ada.id, 1, Some("Punt".into())))
            .await
            .unwrap();

        let mut edited = touchdown_question(1);
        edited.text = "Worth three points?".into();
        let err = update_question(&state, question.id, edited).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        let err = delete_question(&state, question.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = set_correct_option(&state, question.id, "Field goal".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let published = set_correct_option(&state, question.id, "Touchdown".into())
            .await
            .unwrap();
        assert_eq!(published.correct_option.as_deref(), Some("Touchdown"));
        assert!(
            set_correct_option(&state, question.id, "Touchdown".into())
                .await
                .is_ok()
        );
        let err = set_correct_option(&state, question.id, "Punt".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn unanswered_question_can_be_deleted() {
        let (state, _repos, id) = setup().await;
        let question = create_question(&state, id, touchdown_question(1))
            .await
            .unwrap();
        delete_question(&state, question.id).await.unwrap();
        let err = delete_question(&state, question.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn reinstatement_targets_exactly_one_round() {
        let (state, repos, id) = setup().await;
        set_round(&state, id, 3).await.unwrap();
        let ada = join(&repos, id, "Ada").await;
        let grace = join(&repos, id, "Grace").await;
        let linus = join(&repos, id, "Linus").await;
        let _barbara = join(&repos, id, "Barbara").await;
        eliminate(&repos, &ada, 2).await;
        eliminate(&repos, &grace, 2).await;
        eliminate(&repos, &linus, 1).await;

        let response = reinstate_participants(&state, id, 2).await.unwrap();
        assert_eq!(response.intended, 2);
        assert_eq!(response.reinstated, 2);

        for participant in [&ada, &grace] {
            let row = repos.participants.get(participant.id).await.unwrap().unwrap();
            assert_eq!(row.status, ParticipantStatus::Active);
            // Round 3 never opened, so nothing about it is waived.
            assert_eq!(row.reinstated_round, None);
        }
        let linus = repos.participants.get(linus.id).await.unwrap().unwrap();
        assert_eq!(linus.status, ParticipantStatus::Eliminated { round: 1 });

        let active = list_participants(&state, id, ParticipantFilter::Active)
            .await
            .unwrap();
        assert_eq!(active.len(), 3);

        let empty = reinstate_participants(&state, id, 2).await.unwrap();
        assert_eq!((empty.intended, empty.reinstated), (0, 0));
    }

    #[tokio::test]
    async fn reinstatement_waives_only_a_settled_outcome() {
        let (state, repos, id) = setup().await;
        set_round(&state, id, 1).await.unwrap();
        let ada = join(&repos, id, "Ada").await;
        eliminate(&repos, &ada, 1).await;
        set_round(&state, id, 2).await.unwrap();

        reinstate_participants(&state, id, 1).await.unwrap();
        let row = repos.participants.get(ada.id).await.unwrap().unwrap();
        assert_eq!(row.status, ParticipantStatus::Active);
        assert_eq!(row.reinstated_round, None);

        // Answered while the window is open: the answer cannot be replaced.
        set_submission_open(&state, id, true).await.unwrap();
        let linus = join(&repos, id, "Linus").await;
        repos
            .answers
            .insert(Answer::new(id, linus.id, 2, Some("Punt".into())))
            .await
            .unwrap();
        eliminate(&repos, &linus, 2).await;
        reinstate_participants(&state, id, 2).await.unwrap();
        let row = repos.participants.get(linus.id).await.unwrap().unwrap();
        assert_eq!(row.reinstated_round, Some(2));

        // Closed window: the blank is final.
        let grace = join(&repos, id, "Grace").await;
        set_submission_open(&state, id, false).await.unwrap();
        repos
            .answers
            .insert(Answer::new(id, grace.id, 2, None))
            .await
            .unwrap();
        eliminate(&repos, &grace, 2).await;
        reinstate_participants(&state, id, 2).await.unwrap();
        let row = repos.participants.get(grace.id).await.unwrap().unwrap();
        assert_eq!(row.reinstated_round, Some(2));
    }

    #[tokio::test]
    async fn failed_rows_are_reported_without_rolling_back_the_rest() {
        let (state, repos, id, store) = setup_with_store().await;
        set_round(&state, id, 2).await.unwrap();
        let ada = join(&repos, id, "Ada").await;
        let grace = join(&repos, id, "Grace").await;
        let linus = join(&repos, id, "Linus").await;
        for participant in [&ada, &grace, &linus] {
            eliminate(&repos, participant, 1).await;
        }
        store.break_participant(grace.id);

        let err = reinstate_participants(&state, id, 1).await.unwrap_err();
        match err {
            ServiceError::PartialFailure {
                succeeded,
                intended,
                ..
            } => assert_eq!((succeeded, intended), (2, 3)),
            other => panic!("expected a partial failure, got {other:?}"),
        }

        for participant in [&ada, &linus] {
            let row = repos.participants.get(participant.id).await.unwrap().unwrap();
            assert_eq!(row.status, ParticipantStatus::Active);
        }
        let grace = repos.participants.get(grace.id).await.unwrap().unwrap();
        assert_eq!(grace.status, ParticipantStatus::Eliminated { round: 1 });

        // A retry only touches the row that is still eliminated.
        let err = reinstate_participants(&state, id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PartialFailure {
                succeeded: 0,
                intended: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn questions_cannot_land_in_a_round_that_is_over() {
        let (state, _repos, id) = setup().await;
        set_round(&state, id, 1).await.unwrap();
        set_submission_open(&state, id, true).await.unwrap();
        set_submission_open(&state, id, false).await.unwrap();
        let err = create_question(&state, id, touchdown_question(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        set_round(&state, id, 2).await.unwrap();
        let err = create_question(&state, id, touchdown_question(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let current = create_question(&state, id, touchdown_question(2))
            .await
            .unwrap();
        let later = create_question(&state, id, touchdown_question(3))
            .await
            .unwrap();
        let err = update_question(&state, later.id, touchdown_question(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let mut edited = touchdown_question(2);
        edited.text = "Worth seven points?".into();
        let updated = update_question(&state, current.id, edited).await.unwrap();
        assert_eq!(updated.text, "Worth seven points?");
        assert!(list_questions(&state, id, Some(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tally_counts_options_in_order() {
        let (state, repos, id) = setup().await;
        create_question(&state, id, touchdown_question(1))
            .await
            .unwrap();
        for (name, answer) in [("Ada", Some("Punt")), ("Grace", None), ("Linus", Some("Punt"))] {
            let participant = join(&repos, id, name).await;
            repos
                .answers
                .insert(Answer::new(id, participant.id, 1, answer.map(Into::into)))
                .await
                .unwrap();
        }

        let tally = tally(&state, id, 1).await.unwrap();
        let counts: Vec<_> = tally
            .counts
            .iter()
            .map(|count| (count.option.as_str(), count.count))
            .collect();
        assert_eq!(counts, vec![("Touchdown", 0), ("Punt", 2)]);
        assert_eq!(tally.blank, 1);
        assert_eq!(tally.total, 3);
    }

    #[tokio::test]
    async fn unknown_contest_is_not_found() {
        let (state, _repos, _id) = setup().await;
        let err = set_round(&state, Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = create_question(&state, Uuid::new_v4(), touchdown_question(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
