/// Domain records.
pub mod contest;
/// Per-table change feeds.
pub mod feed;
/// Round state derivation.
pub mod reconcile;
/// Round state machine.
pub mod round;
/// Signed-in users.
pub mod session;
mod sse;

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        contest_store::ContestStore,
        repositories::{Feeds, Repositories},
    },
    error::ServiceError,
    services::round_lifecycle::LifecycleHandle,
    state::session::SessionRegistry,
};

pub use self::sse::SseHub;
use self::sse::SseState;

/// State handle shared by every route and task.
pub type SharedState = Arc<AppState>;
/// Upper bound for one guarded lifecycle write.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycles are keyed by contest and user: one actor per participant.
pub type LifecycleKey = (Uuid, Uuid);

/// Central application state: storage handle, change feeds, SSE hubs, sessions and the running
/// participant lifecycles.
pub struct AppState {
    store: RwLock<Option<Arc<dyn ContestStore>>>,
    feeds: Feeds,
    sse: SseState,
    sessions: SessionRegistry,
    lifecycles: DashMap<LifecycleKey, LifecycleHandle>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
}

impl AppState {
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            feeds: Feeds::new(config.feed_capacity),
            sse: SseState::new(config.sse_capacity),
            sessions: SessionRegistry::new(),
            lifecycles: DashMap::new(),
            degraded: degraded_tx,
            config,
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Connected store, if any.
    pub async fn store(&self) -> Option<Arc<dyn ContestStore>> {
        self.store.read().await.as_ref().cloned()
    }

    /// Install a store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn ContestStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Fetch the installed store or fail with [`ServiceError::Degraded`].
    pub async fn require_store(&self) -> Result<Arc<dyn ContestStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Repositories bound to the installed store, publishing on the shared feeds.
    pub async fn repositories(&self) -> Result<Repositories, ServiceError> {
        let store = self.require_store().await?;
        Ok(Repositories::new(store, &self.feeds))
    }

    /// Change feeds of the four tables.
    pub fn feeds(&self) -> &Feeds {
        &self.feeds
    }

    /// Whether the backend is running without storage.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Receiver following degraded mode changes.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Hub of the public contest streams.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Hub of the admin stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin().hub()
    }

    /// Token guard that ensures a single admin SSE subscriber at a time.
    pub fn admin_token(&self) -> &Mutex<Option<String>> {
        self.sse.admin().token()
    }

    /// Signed-in sessions.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Running participant lifecycles.
    pub fn lifecycles(&self) -> &DashMap<LifecycleKey, LifecycleHandle> {
        &self.lifecycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::contest_store::memory::MemoryContestStore;

    #[tokio::test]
    async fn store_installation_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.repositories().await,
            Err(ServiceError::Degraded)
        ));

        state.set_store(Arc::new(MemoryContestStore::new())).await;
        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow_and_update());
        assert!(state.repositories().await.is_ok());

        state.clear_store().await;
        assert!(state.is_degraded().await);
    }
}
