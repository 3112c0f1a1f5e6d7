use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

/// Identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// Stable user id, shared by every session of the user.
    pub id: Uuid,
    /// Name shown to other participants.
    pub display_name: String,
}

/// Session handle given to each lifecycle at construction.
#[derive(Debug, Clone)]
pub struct SessionContext {
    user: watch::Receiver<Option<CurrentUser>>,
}

impl SessionContext {
    /// Context signed in as `user` until the returned sender publishes `None`.
    #[cfg(test)]
    pub(crate) fn fixed(user: CurrentUser) -> (watch::Sender<Option<CurrentUser>>, Self) {
        let (tx, rx) = watch::channel(Some(user));
        (tx, Self { user: rx })
    }

    /// User of the session, or `None` once signed out.
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.user.borrow().clone()
    }

    /// Resolve once the session has no user, either now or after a change.
    pub async fn signed_out(&mut self) {
        loop {
            if self.user.borrow_and_update().is_none() {
                return;
            }
            if self.user.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Sessions keyed by their bearer token.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, watch::Sender<Option<CurrentUser>>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return its token.
    pub fn sign_in(&self, user: CurrentUser) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let (tx, _rx) = watch::channel(Some(user));
        self.sessions.insert(token.clone(), tx);
        token
    }

    /// Close the session, notifying every context derived from it. Returns whether it existed.
    pub fn sign_out(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, tx)) => {
                let _ = tx.send(None);
                true
            }
            None => false,
        }
    }

    /// Session handle for a lifecycle, following later sign-outs.
    pub fn context(&self, token: &str) -> Option<SessionContext> {
        self.sessions.get(token).map(|tx| SessionContext {
            user: tx.subscribe(),
        })
    }

    /// User currently signed in with `token`.
    pub fn user(&self, token: &str) -> Option<CurrentUser> {
        self.sessions.get(token).and_then(|tx| tx.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn ada() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            display_name: "Ada".into(),
        }
    }

    #[tokio::test]
    async fn sign_out_wakes_contexts() {
        let registry = SessionRegistry::new();
        let token = registry.sign_in(ada());
        let mut context = registry.context(&token).unwrap();
        assert!(context.current_user().is_some());

        let waiter = tokio::spawn(async move {
            context.signed_out().await;
            context.current_user()
        });

        assert!(registry.sign_out(&token));
        let user = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(user.is_none());
        assert!(registry.context(&token).is_none());
        assert!(!registry.sign_out(&token));
    }

    #[tokio::test]
    async fn signed_in_context_stays_pending() {
        let (_tx, mut context) = SessionContext::fixed(ada());
        let result = timeout(Duration::from_millis(50), context.signed_out()).await;
        assert!(result.is_err());
    }
}
