//! Bridges the change feeds onto the SSE hubs.
//!
//! Public subscribers see contests, participants and the questions of rounds that already
//! started, with the correct option masked while answers are accepted. Admins additionally see
//! every question in full and every recorded answer.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        contest::{ContestSummary, ParticipantSummary, QuestionSummary},
        sse::{
            AnswerRecordedEvent, ContestChangedEvent, ParticipantChangedEvent,
            QuestionChangedEvent, ServerEvent, SystemStatus,
        },
    },
    state::{
        SharedState,
        contest::{Contest, RoundWindow},
        feed::{Change, Delivery, Subscription},
    },
};

const EVENT_CONTEST_UPDATED: &str = "contest.updated";
const EVENT_PARTICIPANT_UPDATED: &str = "participant.updated";
const EVENT_QUESTION_UPDATED: &str = "question.updated";
const EVENT_ANSWER_RECORDED: &str = "answer.recorded";
const EVENT_SYSTEM_STATUS: &str = "system_status";
const EVENT_RESYNC: &str = "resync";

/// Last round and window seen per contest, used to scope question events.
type RoundCursor = Arc<DashMap<Uuid, (u32, RoundWindow)>>;

/// Subscribe to every feed and forward the changes to the SSE hubs.
///
/// Delivery stops when the returned subscriptions are dropped.
pub fn spawn_feed_bridge(state: &SharedState) -> Vec<Subscription> {
    let feeds = state.feeds();
    let cursor: RoundCursor = Arc::new(DashMap::new());

    let contests = {
        let state = state.clone();
        let cursor = cursor.clone();
        feeds.contests.subscribe(
            |_| true,
            move |delivery| match delivery {
                Delivery::Change(change) => {
                    cursor.insert(
                        change.record.id,
                        (change.record.current_round, change.record.window()),
                    );
                    broadcast_contest(&state, change);
                }
                Delivery::Gap { skipped } => broadcast_resync(&state, "contests", skipped),
            },
        )
    };

    let participants = {
        let state = state.clone();
        feeds.participants.subscribe(
            |_| true,
            move |delivery| match delivery {
                Delivery::Change(change) => {
                    let contest_id = change.record.contest_id;
                    let payload = ParticipantChangedEvent {
                        kind: change.kind.into(),
                        participant: ParticipantSummary::from(change.record),
                    };
                    send_public_event(
                        &state,
                        EVENT_PARTICIPANT_UPDATED,
                        Some(contest_id),
                        &payload,
                    );
                    send_admin_event(&state, EVENT_PARTICIPANT_UPDATED, &payload);
                }
                Delivery::Gap { skipped } => broadcast_resync(&state, "participants", skipped),
            },
        )
    };

    let questions = {
        let state = state.clone();
        let cursor = cursor.clone();
        feeds.questions.subscribe(
            |_| true,
            move |delivery| match delivery {
                Delivery::Change(change) => {
                    let contest_id = change.record.contest_id;
                    let round = change.record.round;
                    let kind = change.kind.into();

                    let admin = QuestionChangedEvent {
                        kind,
                        question: QuestionSummary::from(change.record.clone()),
                    };
                    send_admin_event(&state, EVENT_QUESTION_UPDATED, &admin);

                    let public_window = cursor.get(&contest_id).and_then(|entry| {
                        let (current_round, window) = *entry;
                        public_window(current_round, window, round)
                    });
                    match public_window {
                        Some(window) => {
                            let payload = QuestionChangedEvent {
                                kind,
                                question: QuestionSummary::public(change.record, window),
                            };
                            send_public_event(
                                &state,
                                EVENT_QUESTION_UPDATED,
                                Some(contest_id),
                                &payload,
                            );
                        }
                        None => {
                            debug!(%contest_id, round, "question change kept off the public stream")
                        }
                    }
                }
                Delivery::Gap { skipped } => broadcast_resync(&state, "questions", skipped),
            },
        )
    };

    let answers = {
        let state = state.clone();
        feeds.answers.subscribe(
            |_| true,
            move |delivery| match delivery {
                Delivery::Change(change) => {
                    let answer = change.record;
                    let payload = AnswerRecordedEvent {
                        contest_id: answer.contest_id,
                        participant_id: answer.participant_id,
                        round: answer.round,
                        answer: answer.answer,
                    };
                    send_admin_event(&state, EVENT_ANSWER_RECORDED, &payload);
                }
                Delivery::Gap { skipped } => broadcast_resync(&state, "answers", skipped),
            },
        )
    };

    vec![contests, participants, questions, answers]
}

/// Window a question of `question_round` is shown under publicly, or `None` while its round has
/// not started.
fn public_window(
    current_round: u32,
    window: RoundWindow,
    question_round: u32,
) -> Option<RoundWindow> {
    if question_round < current_round {
        Some(RoundWindow::Closed)
    } else if question_round == current_round {
        Some(window)
    } else {
        None
    }
}

fn broadcast_contest(state: &SharedState, change: Change<Contest>) {
    let contest_id = change.record.id;
    let payload = ContestChangedEvent {
        kind: change.kind.into(),
        contest: ContestSummary::from(change.record),
    };
    send_public_event(state, EVENT_CONTEST_UPDATED, Some(contest_id), &payload);
    send_admin_event(state, EVENT_CONTEST_UPDATED, &payload);
}

/// Tell every subscriber that events of `feed` were dropped and lists should be reloaded.
fn broadcast_resync(state: &SharedState, feed: &str, skipped: u64) {
    warn!(feed, skipped, "SSE bridge lagged behind a change feed");
    let payload = serde_json::json!({ "feed": feed, "skipped": skipped });
    send_public_event(state, EVENT_RESYNC, None, &payload);
    send_admin_event(state, EVENT_RESYNC, &payload);
}

/// Broadcast whether the backend is in degraded mode.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_public_event(state, EVENT_SYSTEM_STATUS, None, &payload);
    send_admin_event(state, EVENT_SYSTEM_STATUS, &payload);
}

fn send_public_event(
    state: &SharedState,
    event: &str,
    contest_id: Option<Uuid>,
    payload: &impl Serialize,
) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            let event = match contest_id {
                Some(id) => event.for_contest(id),
                None => event,
            };
            state.public_sse().broadcast(event)
        }
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_admin_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.admin_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{contest_store::memory::MemoryContestStore, repositories::ContestPatch},
        state::{AppState, contest::Question},
    };

    async fn next_public(
        rx: &mut tokio::sync::broadcast::Receiver<ServerEvent>,
    ) -> Option<ServerEvent> {
        timeout(Duration::from_millis(500), rx.recv()).await.ok()?.ok()
    }

    fn question(contest_id: Uuid, round: u32) -> Question {
        let now = std::time::SystemTime::now();
        Question {
            id: Uuid::new_v4(),
            contest_id,
            round,
            text: "Worth six points?".into(),
            options: vec!["Touchdown".into(), "Punt".into()],
            correct_option: Some("Touchdown".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn future_rounds_stay_private() {
        assert_eq!(public_window(1, RoundWindow::Open, 2), None);
        assert_eq!(
            public_window(2, RoundWindow::Open, 2),
            Some(RoundWindow::Open)
        );
        assert_eq!(
            public_window(3, RoundWindow::NotOpened, 2),
            Some(RoundWindow::Closed)
        );
    }

    #[tokio::test]
    async fn open_round_question_is_masked_on_the_public_stream() {
        let state = AppState::new(AppConfig::default());
        state.set_store(Arc::new(MemoryContestStore::new())).await;
        let _bridge = spawn_feed_bridge(&state);
        let mut public = state.public_sse().subscribe();
        let mut admin = state.admin_sse().subscribe();
        let repos = state.repositories().await.unwrap();

        let contest = Contest::new("Final".into(), None);
        repos.contests.insert(contest.clone()).await.unwrap();
        let open = ContestPatch {
            current_round: Some(1),
            submission_open: Some(true),
            ..ContestPatch::default()
        };
        repos.contests.update(&contest, &open).await.unwrap();

        let created = next_public(&mut public).await.unwrap();
        assert_eq!(created.event.as_deref(), Some(EVENT_CONTEST_UPDATED));
        assert!(created.visible_to(contest.id));
        assert!(!created.visible_to(Uuid::new_v4()));
        next_public(&mut public).await.unwrap();

        // Let the bridge record the round before the question lands.
        tokio::time::sleep(Duration::from_millis(20)).await;
        repos.questions.insert(question(contest.id, 1)).await.unwrap();
        repos.questions.insert(question(contest.id, 2)).await.unwrap();

        let masked = next_public(&mut public).await.unwrap();
        assert_eq!(masked.event.as_deref(), Some(EVENT_QUESTION_UPDATED));
        assert!(!masked.data.contains("\"correct_option\":\"Touchdown\""));
        assert!(next_public(&mut public).await.is_none());

        let mut admin_questions = 0;
        while let Some(event) = next_public(&mut admin).await {
            if event.event.as_deref() == Some(EVENT_QUESTION_UPDATED) {
                assert!(event.data.contains("\"correct_option\":\"Touchdown\""));
                admin_questions += 1;
            }
        }
        assert_eq!(admin_questions, 2);
    }
}
