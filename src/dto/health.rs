use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Configured storage backend.
    pub storage: String,
    /// Participant lifecycles currently running.
    pub lifecycles: usize,
}

impl HealthResponse {
    /// Healthy response.
    pub fn ok(storage: &str, lifecycles: usize) -> Self {
        Self {
            status: "ok".to_string(),
            storage: storage.to_string(),
            lifecycles,
        }
    }

    /// Response while the storage backend is unreachable.
    pub fn degraded(storage: &str, lifecycles: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            storage: storage.to_string(),
            lifecycles,
        }
    }
}
