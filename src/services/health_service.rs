use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the storage health and how many round lifecycles are running.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = state.config().storage.name();
    let lifecycles = state.lifecycles().len();

    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
                return HealthResponse::degraded(storage, lifecycles);
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded(storage, lifecycles)
    } else {
        HealthResponse::ok(storage, lifecycles)
    }
}
