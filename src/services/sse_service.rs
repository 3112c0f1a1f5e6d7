use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        participant::RoundViewResponse,
        sse::{AdminHandshake, Handshake, ServerEvent},
    },
    error::ServiceError,
    services::{participant_service, public_service},
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_ADMIN_TOKEN: &str = "admin_token";
const EVENT_ROUND_VIEW: &str = "round.view";
const FORWARD_BUFFER: usize = 8;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe to the public stream of one contest.
///
/// Fails with `NotFound` when the contest does not exist.
pub async fn subscribe_contest(
    state: &SharedState,
    contest_id: Uuid,
) -> Result<(broadcast::Receiver<ServerEvent>, ServerEvent), ServiceError> {
    // Subscribe first so nothing committed after the existence check is missed.
    let receiver = state.public_sse().subscribe();
    public_service::get_contest(state, contest_id).await?;
    let handshake = handshake_event(state, "contest", format!("contest {contest_id}")).await;
    Ok((receiver, handshake))
}

/// Subscribe to the admin-only SSE stream, reserving the admin token.
pub async fn subscribe_admin(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, ServerEvent), ServiceError> {
    let token = claim_admin_token(state).await?;
    let receiver = state.admin_sse().subscribe();
    match ServerEvent::json(EVENT_ADMIN_TOKEN.to_string(), &AdminHandshake { token }) {
        Ok(handshake) => Ok((receiver, handshake)),
        Err(err) => {
            reset_admin_token(state.clone()).await;
            Err(ServiceError::Internal(format!(
                "failed to serialize admin handshake: {err}"
            )))
        }
    }
}

/// Identifies the target SSE stream so we can perform stream-specific
/// bookkeeping when the connection is torn down.
#[derive(Clone)]
pub enum StreamKind {
    /// Public events of one contest; stream-wide events pass through too.
    Contest(Uuid),
    /// Carries the shared state so teardown can release the admin token.
    Admin(SharedState),
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    handshake: ServerEvent,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(FORWARD_BUFFER);

    tokio::spawn(async move {
        let contest_id = match &kind {
            StreamKind::Contest(id) => Some(*id),
            StreamKind::Admin(_) => None,
        };

        if tx.send(Ok(to_event(handshake))).await.is_ok() {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    recv_result = receiver.recv() => {
                        match recv_result {
                            Ok(payload) => {
                                if contest_id.is_some_and(|id| !payload.visible_to(id)) {
                                    continue;
                                }
                                if tx.send(Ok(to_event(payload))).await.is_err() {
                                    break;
                                }
                            }
                            Err(RecvError::Closed) => break,
                            Err(RecvError::Lagged(skipped)) => {
                                // Clients resync from the REST API; keep the stream alive.
                                warn!(skipped, "SSE subscriber lagged");
                                continue;
                            }
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Contest(contest_id) => {
                info!(%contest_id, "contest SSE stream disconnected")
            }
            StreamKind::Admin(state) => {
                reset_admin_token(state).await;
                info!("admin SSE stream disconnected")
            }
        }
    });

    with_keep_alive(ReceiverStream::new(rx))
}

/// Stream every view published by the caller's round lifecycle in `contest_id`.
///
/// The lifecycle is started when the participant joined earlier but none is running.
pub async fn round_stream(
    state: SharedState,
    token: String,
    contest_id: Uuid,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let mut views = participant_service::watch_round(&state, &token, contest_id).await?;
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(FORWARD_BUFFER);

    tokio::spawn(async move {
        loop {
            let view = RoundViewResponse::from(views.borrow_and_update().clone());
            match ServerEvent::json(EVENT_ROUND_VIEW.to_string(), &view) {
                Ok(event) => {
                    if tx.send(Ok(to_event(event))).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to serialize round view"),
            }

            tokio::select! {
                _ = tx.closed() => break,
                changed = views.changed() => {
                    // The lifecycle stopped: sign-out, leave or shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(%contest_id, "round SSE stream disconnected");
    });

    Ok(with_keep_alive(ReceiverStream::new(rx)))
}

/// Forward degraded-mode changes to both hubs until the state is dropped.
pub fn spawn_status_broadcaster(state: &SharedState) -> tokio::task::JoinHandle<()> {
    let mut watcher: watch::Receiver<bool> = state.degraded_watcher();
    let state = state.clone();
    tokio::spawn(async move {
        while watcher.changed().await.is_ok() {
            let degraded = *watcher.borrow_and_update();
            super::sse_events::broadcast_system_status(&state, degraded);
        }
    })
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn with_keep_alive<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

async fn handshake_event(state: &SharedState, stream: &str, message: String) -> ServerEvent {
    let payload = Handshake {
        stream: stream.to_string(),
        message,
        degraded: state.is_degraded().await,
    };
    ServerEvent::json(EVENT_HANDSHAKE.to_string(), &payload)
        .unwrap_or_else(|_| ServerEvent::new(Some(EVENT_HANDSHAKE.to_string()), String::new()))
}

/// Reserve the admin token for a new stream, generating one when none exists
/// and failing if another connection already holds it.
async fn claim_admin_token(state: &SharedState) -> Result<String, ServiceError> {
    let mut guard = state.admin_token().lock().await;
    match &mut *guard {
        slot @ None => {
            let token = Uuid::new_v4().simple().to_string();
            slot.replace(token.clone());
            Ok(token)
        }
        Some(_) => Err(ServiceError::Unauthorized(
            "Another admin SSE stream is already active".into(),
        )),
    }
}

/// Clear the stored admin token so the next admin connection negotiates a fresh one.
async fn reset_admin_token(state: SharedState) {
    let mut guard = state.admin_token().lock().await;
    guard.take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn only_one_admin_stream_holds_the_token() {
        let state = AppState::new(AppConfig::default());
        let (_rx, handshake) = subscribe_admin(&state).await.unwrap();
        assert_eq!(handshake.event.as_deref(), Some(EVENT_ADMIN_TOKEN));

        let second = subscribe_admin(&state).await;
        assert!(matches!(second, Err(ServiceError::Unauthorized(_))));

        reset_admin_token(state.clone()).await;
        assert!(subscribe_admin(&state).await.is_ok());
    }

    #[tokio::test]
    async fn dropping_the_admin_response_releases_the_token() {
        use axum::{http::header::CONTENT_TYPE, response::IntoResponse};

        let state = AppState::new(AppConfig::default());
        let (receiver, handshake) = subscribe_admin(&state).await.unwrap();
        let response =
            to_sse_stream(receiver, handshake, StreamKind::Admin(state.clone())).into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        drop(response);
        tokio::time::timeout(Duration::from_secs(1), async {
            while state.admin_token().lock().await.is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unknown_contest_stream_is_not_found() {
        let state = AppState::new(AppConfig::default());
        state
            .set_store(std::sync::Arc::new(
                crate::dao::contest_store::memory::MemoryContestStore::new(),
            ))
            .await;
        let result = subscribe_contest(&state, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
