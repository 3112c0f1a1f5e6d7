use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::session::{SessionResponse, SignInRequest},
    error::AppError,
    services::session_service,
    state::SharedState,
};

pub(crate) const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Sign-in and sign-out endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/sessions", post(sign_in).delete(sign_out))
}

/// Read the session token sent by a signed-in participant.
pub(crate) fn session_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| {
            AppError::Unauthorized("missing session token header `X-Session-Token`".into())
        })
}

/// Open a session. The returned token identifies the participant on every other route.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = SignInRequest,
    responses(
        (status = 201, description = "Session opened", body = SessionResponse),
        (status = 400, description = "Invalid display name")
    )
)]
pub async fn sign_in(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SignInRequest>>,
) -> (StatusCode, Json<SessionResponse>) {
    (
        StatusCode::CREATED,
        Json(session_service::sign_in(&state, payload)),
    )
}

/// Close the session and stop every round lifecycle started with it.
#[utoipa::path(
    delete,
    path = "/sessions",
    tag = "sessions",
    params(("X-Session-Token" = String, Header, description = "Token returned by POST /sessions")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 401, description = "Unknown session")
    )
)]
pub async fn sign_out(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = session_token(&headers)?;
    session_service::sign_out(&state, &token)?;
    Ok(StatusCode::NO_CONTENT)
}
