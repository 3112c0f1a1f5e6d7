use tokio::sync::{Mutex, broadcast};

use crate::dto::sse::ServerEvent;

/// SSE-specific sub-state carved out from [`AppState`](super::AppState).
pub struct SseState {
    public: SseHub,
    admin: AdminSseState,
}

impl SseState {
    /// Build the SSE sub-tree; both hubs share the configured capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            public: SseHub::new(capacity),
            admin: AdminSseState::new(capacity),
        }
    }

    pub fn public(&self) -> &SseHub {
        &self.public
    }

    pub fn admin(&self) -> &AdminSseState {
        &self.admin
    }
}

/// Admin hub plus the token of the single admin connection allowed at a time.
pub struct AdminSseState {
    hub: SseHub,
    token: Mutex<Option<String>>,
}

impl AdminSseState {
    fn new(capacity: usize) -> Self {
        Self {
            hub: SseHub::new(capacity),
            token: Mutex::new(None),
        }
    }

    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    pub fn token(&self) -> &Mutex<Option<String>> {
        &self.token
    }
}

/// Broadcast hub behind one SSE stream family.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
