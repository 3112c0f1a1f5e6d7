//! Library crate for knockout-back, exposing modules for binaries and integration tests.

/// Runtime configuration loaded from disk and the environment.
pub mod config;
/// Storage backends, the contest store trait and typed repositories.
pub mod dao;
/// Request and response payloads of the HTTP and SSE surfaces.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Axum route trees.
pub mod routes;
/// Business operations called by the routes.
pub mod services;
/// Shared application state, domain records and change feeds.
pub mod state;
