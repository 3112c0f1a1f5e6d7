use axum::Router;

use crate::state::SharedState;

/// Admin endpoints guarded by the admin token.
pub mod admin;
/// Participant-facing contest endpoints.
pub mod contests;
/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Health probe.
pub mod health;
/// Session sign-in and sign-out.
pub mod sessions;
/// Server-sent event streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sessions::router())
        .merge(contests::router())
        .merge(sse::router())
        .merge(admin::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
