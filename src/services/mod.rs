/// Admin operations on contests, questions and participants.
pub mod admin_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Joining, leaving and answering on behalf of a signed-in participant.
pub mod participant_service;
/// Public service for read-only contest information.
pub mod public_service;
/// Per-participant round state machine driven by the storage feeds.
pub mod round_lifecycle;
/// Session sign-in, sign-out and authentication.
pub mod session_service;
/// Bridge from storage change feeds to SSE events.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
