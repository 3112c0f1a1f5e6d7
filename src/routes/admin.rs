use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        admin::{
            CorrectOptionRequest, CreateContestRequest, ParticipantQuery, QuestionQuery,
            QuestionRequest, ReinstateRequest, ReinstateResponse, SetRoundRequest, TallyResponse,
            ToggleRequest,
        },
        contest::{ContestSummary, ParticipantSummary, QuestionSummary},
    },
    error::AppError,
    services::admin_service,
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints driving contests, questions and reinstatements.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/contests", get(list_contests).post(create_contest))
        .route("/admin/contests/{id}", get(get_contest))
        .route("/admin/contests/{id}/lobby", post(set_lobby))
        .route("/admin/contests/{id}/submission", post(set_submission))
        .route("/admin/contests/{id}/round", post(set_round))
        .route("/admin/contests/{id}/finish", post(finish_contest))
        .route(
            "/admin/contests/{id}/questions",
            get(list_questions).post(create_question),
        )
        .route(
            "/admin/questions/{id}",
            put(update_question).delete(delete_question),
        )
        .route("/admin/questions/{id}/correct-option", post(set_correct_option))
        .route("/admin/contests/{id}/participants", get(list_participants))
        .route("/admin/contests/{id}/reinstate", post(reinstate_participants))
        .route("/admin/contests/{id}/rounds/{round}/tally", get(tally))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// List every contest, newest first.
#[utoipa::path(
    get,
    path = "/admin/contests",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses((status = 200, description = "Contests", body = [ContestSummary]))
)]
pub async fn list_contests(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ContestSummary>>, AppError> {
    Ok(Json(admin_service::list_contests(&state).await?))
}

/// Create a contest. It starts with the lobby closed and no round.
#[utoipa::path(
    post,
    path = "/admin/contests",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    request_body = CreateContestRequest,
    responses(
        (status = 201, description = "Contest created", body = ContestSummary),
        (status = 400, description = "Invalid name or start time")
    )
)]
pub async fn create_contest(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateContestRequest>>,
) -> Result<(StatusCode, Json<ContestSummary>), AppError> {
    let contest = admin_service::create_contest(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(contest)))
}

/// Fetch one contest.
#[utoipa::path(
    get,
    path = "/admin/contests/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    responses(
        (status = 200, description = "Contest", body = ContestSummary),
        (status = 404, description = "Unknown contest")
    )
)]
pub async fn get_contest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContestSummary>, AppError> {
    Ok(Json(admin_service::get_contest(&state, id).await?))
}

/// Open or close the lobby.
#[utoipa::path(
    post,
    path = "/admin/contests/{id}/lobby",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Lobby updated", body = ContestSummary),
        (status = 409, description = "Contest finished")
    )
)]
pub async fn set_lobby(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<ContestSummary>, AppError> {
    Ok(Json(
        admin_service::set_lobby_open(&state, id, payload.open).await?,
    ))
}

/// Open or close the submission window of the current round.
#[utoipa::path(
    post,
    path = "/admin/contests/{id}/submission",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Window updated", body = ContestSummary),
        (status = 409, description = "No round started, round already closed or contest finished")
    )
)]
pub async fn set_submission(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<ContestSummary>, AppError> {
    Ok(Json(
        admin_service::set_submission_open(&state, id, payload.open).await?,
    ))
}

/// Advance the current round, closing the open window.
#[utoipa::path(
    post,
    path = "/admin/contests/{id}/round",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    request_body = SetRoundRequest,
    responses(
        (status = 200, description = "Round updated", body = ContestSummary),
        (status = 409, description = "Round would decrease or contest finished")
    )
)]
pub async fn set_round(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoundRequest>,
) -> Result<Json<ContestSummary>, AppError> {
    Ok(Json(
        admin_service::set_round(&state, id, payload.round).await?,
    ))
}

/// Finish the contest.
#[utoipa::path(
    post,
    path = "/admin/contests/{id}/finish",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    responses((status = 200, description = "Contest finished", body = ContestSummary))
)]
pub async fn finish_contest(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContestSummary>, AppError> {
    Ok(Json(admin_service::finish_contest(&state, id).await?))
}

/// List the questions of a contest.
#[utoipa::path(
    get,
    path = "/admin/contests/{id}/questions",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier"),
    QuestionQuery),
    responses((status = 200, description = "Questions ordered by round", body = [QuestionSummary]))
)]
pub async fn list_questions(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<QuestionQuery>,
) -> Result<Json<Vec<QuestionSummary>>, AppError> {
    Ok(Json(
        admin_service::list_questions(&state, id, query.round).await?,
    ))
}

/// Create the question of a round.
#[utoipa::path(
    post,
    path = "/admin/contests/{id}/questions",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    request_body = QuestionRequest,
    responses(
        (status = 201, description = "Question created", body = QuestionSummary),
        (status = 400, description = "Invalid question"),
        (status = 409, description = "The round already has a question or is over")
    )
)]
pub async fn create_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<QuestionRequest>>,
) -> Result<(StatusCode, Json<QuestionSummary>), AppError> {
    let question = admin_service::create_question(&state, id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Replace a question. Answered questions only accept a missing correct option.
#[utoipa::path(
    put,
    path = "/admin/questions/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Question identifier")),
    request_body = QuestionRequest,
    responses(
        (status = 200, description = "Question updated", body = QuestionSummary),
        (status = 409, description = "Question frozen, target round taken or over")
    )
)]
pub async fn update_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<QuestionRequest>>,
) -> Result<Json<QuestionSummary>, AppError> {
    Ok(Json(
        admin_service::update_question(&state, id, payload).await?,
    ))
}

/// Delete an unanswered question.
#[utoipa::path(
    delete,
    path = "/admin/questions/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Question identifier")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 409, description = "Question already answered")
    )
)]
pub async fn delete_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    admin_service::delete_question(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publish the correct option; participants of the round are judged right away.
#[utoipa::path(
    post,
    path = "/admin/questions/{id}/correct-option",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Question identifier")),
    request_body = CorrectOptionRequest,
    responses(
        (status = 200, description = "Correct option set", body = QuestionSummary),
        (status = 400, description = "Option is not one of the question's options"),
        (status = 409, description = "A different option was already published for an answered round")
    )
)]
pub async fn set_correct_option(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CorrectOptionRequest>>,
) -> Result<Json<QuestionSummary>, AppError> {
    Ok(Json(
        admin_service::set_correct_option(&state, id, payload.option).await?,
    ))
}

/// List participants, optionally filtered by status.
#[utoipa::path(
    get,
    path = "/admin/contests/{id}/participants",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier"),
    ParticipantQuery),
    responses((status = 200, description = "Participants in join order", body = [ParticipantSummary]))
)]
pub async fn list_participants(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Json<Vec<ParticipantSummary>>, AppError> {
    Ok(Json(
        admin_service::list_participants(&state, id, query.into()).await?,
    ))
}

/// Reinstate every participant eliminated in the given round.
#[utoipa::path(
    post,
    path = "/admin/contests/{id}/reinstate",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier")),
    request_body = ReinstateRequest,
    responses(
        (status = 200, description = "All targeted participants reinstated", body = ReinstateResponse),
        (status = 500, description = "Some participants could not be reinstated; body carries `succeeded` and `intended`")
    )
)]
pub async fn reinstate_participants(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ReinstateRequest>>,
) -> Result<Json<ReinstateResponse>, AppError> {
    Ok(Json(
        admin_service::reinstate_participants(&state, id, payload.round).await?,
    ))
}

/// Answer counts of a round.
#[utoipa::path(
    get,
    path = "/admin/contests/{id}/rounds/{round}/tally",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream"),
    ("id" = String, Path, description = "Contest identifier"),
    ("round" = u32, Path, description = "Round to count")),
    responses((status = 200, description = "Answer counts", body = TallyResponse))
)]
pub async fn tally(
    State(state): State<SharedState>,
    Path((id, round)): Path<(Uuid, u32)>,
) -> Result<Json<TallyResponse>, AppError> {
    Ok(Json(admin_service::tally(&state, id, round).await?))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    let expected = {
        let guard = state.admin_token().lock().await;
        guard.clone()
    };

    match expected {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized(
            "admin SSE stream not initialised yet".into(),
        )),
    }
}
