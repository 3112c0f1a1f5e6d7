use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        contest::{ContestSummary, ParticipantSummary},
        participant::{JoinResponse, RoundViewResponse, SubmitAnswerRequest},
    },
    error::AppError,
    routes::sessions::session_token,
    services::{participant_service, public_service},
    state::SharedState,
};

/// Contest listings plus the participant actions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/contests", get(list_contests))
        .route("/contests/{id}", get(get_contest))
        .route("/contests/{id}/participants", get(list_participants))
        .route("/contests/{id}/join", post(join_contest))
        .route("/contests/{id}/leave", post(leave_contest))
        .route("/contests/{id}/round", get(round_view))
        .route("/contests/{id}/answer", post(submit_answer))
}

/// List contests, newest first.
#[utoipa::path(
    get,
    path = "/contests",
    tag = "contests",
    responses((status = 200, description = "Contests, newest first", body = [ContestSummary]))
)]
pub async fn list_contests(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ContestSummary>>, AppError> {
    Ok(Json(public_service::list_contests(&state).await?))
}

/// Fetch one contest.
#[utoipa::path(
    get,
    path = "/contests/{id}",
    tag = "contests",
    params(("id" = String, Path, description = "Contest identifier")),
    responses(
        (status = 200, description = "Contest", body = ContestSummary),
        (status = 404, description = "Unknown contest")
    )
)]
pub async fn get_contest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContestSummary>, AppError> {
    Ok(Json(public_service::get_contest(&state, id).await?))
}

/// List the participants of a contest.
#[utoipa::path(
    get,
    path = "/contests/{id}/participants",
    tag = "contests",
    params(("id" = String, Path, description = "Contest identifier")),
    responses((status = 200, description = "Participants in join order", body = [ParticipantSummary]))
)]
pub async fn list_participants(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ParticipantSummary>>, AppError> {
    Ok(Json(public_service::list_participants(&state, id).await?))
}

/// Join a contest while its lobby is open. Joining twice returns the same participant.
#[utoipa::path(
    post,
    path = "/contests/{id}/join",
    tag = "contests",
    params(("X-Session-Token" = String, Header, description = "Token returned by POST /sessions"),
    ("id" = String, Path, description = "Contest identifier")),
    responses(
        (status = 200, description = "Joined", body = JoinResponse),
        (status = 401, description = "Unknown session"),
        (status = 409, description = "Lobby closed or contest finished")
    )
)]
pub async fn join_contest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<JoinResponse>, AppError> {
    let token = session_token(&headers)?;
    Ok(Json(
        participant_service::join_contest(&state, &token, id).await?,
    ))
}

/// Stop following the contest. The participant keeps their row and status.
#[utoipa::path(
    post,
    path = "/contests/{id}/leave",
    tag = "contests",
    params(("X-Session-Token" = String, Header, description = "Token returned by POST /sessions"),
    ("id" = String, Path, description = "Contest identifier")),
    responses(
        (status = 204, description = "Lifecycle stopped"),
        (status = 404, description = "Not following this contest")
    )
)]
pub async fn leave_contest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = session_token(&headers)?;
    participant_service::leave_contest(&state, &token, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Round view of the caller.
#[utoipa::path(
    get,
    path = "/contests/{id}/round",
    tag = "contests",
    params(("X-Session-Token" = String, Header, description = "Token returned by POST /sessions"),
    ("id" = String, Path, description = "Contest identifier")),
    responses(
        (status = 200, description = "Round view of the caller", body = RoundViewResponse),
        (status = 404, description = "Not a participant")
    )
)]
pub async fn round_view(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<RoundViewResponse>, AppError> {
    let token = session_token(&headers)?;
    Ok(Json(
        participant_service::round_view(&state, &token, id).await?,
    ))
}

/// Submit the caller's answer for the current round.
#[utoipa::path(
    post,
    path = "/contests/{id}/answer",
    tag = "contests",
    params(("X-Session-Token" = String, Header, description = "Token returned by POST /sessions"),
    ("id" = String, Path, description = "Contest identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = RoundViewResponse),
        (status = 400, description = "Blank or unknown option"),
        (status = 404, description = "Not a participant; retry after joining"),
        (status = 409, description = "Not answering right now")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<RoundViewResponse>, AppError> {
    let token = session_token(&headers)?;
    Ok(Json(
        participant_service::submit_answer(&state, &token, id, payload.selection).await?,
    ))
}
