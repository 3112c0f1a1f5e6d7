use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    config::StorageBackend,
    dao::{
        contest_store::{ContestStore, memory::MemoryContestStore},
        storage::StorageResult,
    },
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Reconnect to the storage backend and keep the shared state in degraded mode when it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = StorageResult<Arc<dyn ContestStore>>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "storage health check failed");
                            if reconnect(&state, store.as_ref()).await {
                                state.update_degraded(false).await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            }
                            warn!(
                                "exhausted storage reconnect attempts; staying in degraded mode"
                            );
                            break;
                        }
                    }
                }

                state.clear_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Try to revive the current connection, entering degraded mode after the first failure.
async fn reconnect(state: &SharedState, store: &dyn ContestStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

/// Connection factory for `backend`, suitable for [`run`].
///
/// The in-memory backend hands out the same store on every call so a reconnect keeps its data.
pub fn connector(
    backend: StorageBackend,
) -> impl FnMut() -> BoxFuture<'static, StorageResult<Arc<dyn ContestStore>>> + Send + 'static {
    let memory = MemoryContestStore::new();
    move || {
        let memory = memory.clone();
        Box::pin(connect(backend, memory))
    }
}

async fn connect(
    backend: StorageBackend,
    memory: MemoryContestStore,
) -> StorageResult<Arc<dyn ContestStore>> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(memory)),
        StorageBackend::Mongo => connect_mongo().await,
        StorageBackend::Couch => connect_couch().await,
    }
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> StorageResult<Arc<dyn ContestStore>> {
    use crate::dao::contest_store::mongodb::{MongoConfig, MongoContestStore};

    let config = MongoConfig::from_env().await?;
    let store = MongoContestStore::connect(config).await?;
    info!("connected to MongoDB");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongo-store"))]
async fn connect_mongo() -> StorageResult<Arc<dyn ContestStore>> {
    Err(backend_disabled("mongo-store"))
}

#[cfg(feature = "couch-store")]
async fn connect_couch() -> StorageResult<Arc<dyn ContestStore>> {
    use crate::dao::contest_store::couchdb::{CouchConfig, CouchContestStore};

    let config = CouchConfig::from_env()?;
    let store = CouchContestStore::connect(config).await?;
    info!("connected to CouchDB");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "couch-store"))]
async fn connect_couch() -> StorageResult<Arc<dyn ContestStore>> {
    Err(backend_disabled("couch-store"))
}

#[cfg(any(not(feature = "mongo-store"), not(feature = "couch-store")))]
fn backend_disabled(feature: &str) -> crate::dao::storage::StorageError {
    crate::dao::storage::StorageError::Unavailable {
        message: format!("storage backend not compiled in; enable the `{feature}` feature"),
        source: format!("feature `{feature}` disabled").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn memory_connector_reuses_one_store() {
        let mut connect = connector(StorageBackend::Memory);
        let first = connect().await.unwrap();
        first
            .insert_contest(crate::state::contest::Contest::new("Final".into(), None).into())
            .await
            .unwrap();

        let second = connect().await.unwrap();
        assert_eq!(second.list_contests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn supervisor_installs_the_store() {
        let state = AppState::new(AppConfig::default());
        let mut degraded = state.degraded_watcher();
        let task = tokio::spawn(run(state.clone(), connector(StorageBackend::Memory)));

        tokio::time::timeout(Duration::from_secs(1), degraded.wait_for(|value| !value))
            .await
            .unwrap()
            .unwrap();
        assert!(state.store().await.is_some());
        task.abort();
    }
}
