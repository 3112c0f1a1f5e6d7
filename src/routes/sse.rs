use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppError,
    routes::sessions::{SESSION_TOKEN_HEADER, session_token},
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

/// `EventSource` cannot send headers, so the round stream also accepts the token as a query.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamTokenQuery {
    /// Session token, used when the `X-Session-Token` header is absent.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sse/contests/{id}",
    tag = "sse",
    params(("id" = String, Path, description = "Contest identifier")),
    responses(
        (status = 200, description = "Public events of one contest", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown contest")
    )
)]
/// Stream public contest, participant and question events of one contest.
pub async fn contest_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, handshake) = sse_service::subscribe_contest(&state, id).await?;
    info!(contest_id = %id, "new contest SSE connection");
    Ok(sse_service::to_sse_stream(
        receiver,
        handshake,
        StreamKind::Contest(id),
    ))
}

#[utoipa::path(
    get,
    path = "/sse/contests/{id}/me",
    tag = "sse",
    params(
        ("id" = String, Path, description = "Contest identifier"),
        ("X-Session-Token" = Option<String>, Header, description = "Token returned by POST /sessions"),
        StreamTokenQuery
    ),
    responses(
        (status = 200, description = "Round views of the caller", content_type = "text/event-stream", body = String),
        (status = 401, description = "Unknown session"),
        (status = 404, description = "Not a participant")
    )
)]
/// Stream the caller's round view every time it changes.
pub async fn round_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StreamTokenQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let token = match query.token {
        Some(token) if !headers.contains_key(SESSION_TOKEN_HEADER) => token,
        _ => session_token(&headers)?,
    };
    let stream = sse_service::round_stream(state, token, id).await?;
    info!(contest_id = %id, "new round SSE connection");
    Ok(stream)
}

#[utoipa::path(
    get,
    path = "/sse/admin",
    tag = "sse",
    responses(
        (status = 200, description = "Admin SSE stream; the first event carries the admin token", content_type = "text/event-stream", body = String),
        (status = 401, description = "Another admin stream is connected")
    )
)]
/// Stream admin-only events, establishing the admin token.
pub async fn admin_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, handshake) = sse_service::subscribe_admin(&state).await?;
    info!("new admin SSE connection");
    Ok(sse_service::to_sse_stream(
        receiver,
        handshake,
        StreamKind::Admin(state),
    ))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/contests/{id}", get(contest_stream))
        .route("/sse/contests/{id}/me", get(round_stream))
        .route("/sse/admin", get(admin_stream))
}
