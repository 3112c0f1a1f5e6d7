//! Per-participant round lifecycle.
//!
//! One task per joined participant owns every write made on that participant's behalf. Feed
//! events, the reinstatement poll and retries only wake the task; it then reloads the rows and
//! runs [`derive`], so the outcome never depends on which feed delivered first.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::{Notify, mpsc, oneshot, watch},
    time::{Instant, Sleep, sleep_until, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::repositories::Repositories,
    error::ServiceError,
    state::{
        DEFAULT_TRANSITION_TIMEOUT, SharedState,
        contest::{Answer, ParticipantStatus, Question, RoundWindow},
        feed::{Delivery, Subscription},
        reconcile::{Derivation, Effect, Observation, derive, next_event},
        round::{Plan, PlanError, RoundEvent, RoundMachine, RoundState},
        session::{CurrentUser, SessionContext},
    },
};

const COMMAND_BUFFER: usize = 8;
/// Reloads allowed after losing an optimistic write before giving up for this wake-up.
const MAX_RECONCILE_ATTEMPTS: usize = 3;
/// Regular steps tried before jumping straight to the target state.
const MAX_STEPS: usize = 8;

/// Whether the view reflects the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    /// Nothing was loaded yet.
    Loading,
    /// Reflects the last reload.
    Live,
    /// The last reload failed; the state shown is the last one reached.
    Errored {
        /// Last failure, for display.
        message: String,
    },
}

/// What a participant sees of their round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundView {
    /// Freshness of the view.
    pub status: ViewStatus,
    /// Current round state.
    pub state: RoundState,
    /// Participant row, once loaded.
    pub participant_id: Option<Uuid>,
    /// Contest's current round.
    pub current_round: u32,
    /// Window of the current round.
    pub window: RoundWindow,
    /// Question of the current round, correct option included.
    pub question: Option<Question>,
    /// Reinstatement checks left while eliminated.
    pub reinstatement_checks_left: Option<u32>,
}

impl RoundView {
    fn loading() -> Self {
        Self {
            status: ViewStatus::Loading,
            state: RoundState::AwaitingRound { round: 0 },
            participant_id: None,
            current_round: 0,
            window: RoundWindow::NotOpened,
            question: None,
            reinstatement_checks_left: None,
        }
    }
}

enum Command {
    Submit {
        selection: String,
        reply: oneshot::Sender<Result<RoundView, ServiceError>>,
    },
    Stop,
}

/// Handle to a running lifecycle. Cloning it does not start another task.
#[derive(Clone)]
pub struct LifecycleHandle {
    run_id: Uuid,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RoundView>,
}

impl LifecycleHandle {
    /// Identifier of this lifecycle run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Latest view.
    pub fn view(&self) -> RoundView {
        self.view.borrow().clone()
    }

    /// Receiver following every published view.
    pub fn watch(&self) -> watch::Receiver<RoundView> {
        self.view.clone()
    }

    /// Whether the task is still alive.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Submit `selection` for the current round and return the resulting view.
    pub async fn submit(&self, selection: String) -> Result<RoundView, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { selection, reply })
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }

    /// Ask the task to stop. Its subscriptions are cancelled when it exits.
    pub fn stop(&self) {
        let _ = self.commands.try_send(Command::Stop);
    }
}

fn stopped() -> ServiceError {
    ServiceError::NotFound("round lifecycle is no longer running".into())
}

/// Start the lifecycle of `user` in `contest_id`.
///
/// The task ends when the session signs out, when [`LifecycleHandle::stop`] is called or when
/// every handle is dropped.
pub fn spawn(
    state: SharedState,
    contest_id: Uuid,
    user: CurrentUser,
    session: SessionContext,
) -> LifecycleHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (view_tx, view_rx) = watch::channel(RoundView::loading());
    let run_id = Uuid::new_v4();

    let retry = Backoff::new(
        state.config().subscription_retry_initial,
        state.config().subscription_retry_max,
    );
    let lifecycle = RoundLifecycle {
        state,
        contest_id,
        user_id: user.id,
        machine: RoundMachine::new(),
        view: view_tx,
        wake: Arc::new(Notify::new()),
        subscriptions: Vec::new(),
        answer_subscription: None,
        participant_id: None,
        retry,
        poll: None,
        polled_round: None,
    };
    tokio::spawn(lifecycle.run(run_id, session, commands_rx));

    LifecycleHandle {
        run_id,
        commands: commands_tx,
        view: view_rx,
    }
}

struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    next_at: Option<Instant>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            next_at: None,
        }
    }

    fn schedule(&mut self) -> Duration {
        let delay = self.current;
        self.next_at = Some(Instant::now() + delay);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
        self.next_at = None;
    }
}

struct ReinstatementPoll {
    remaining: u32,
    next_at: Instant,
}

struct RoundLifecycle {
    state: SharedState,
    contest_id: Uuid,
    user_id: Uuid,
    machine: RoundMachine,
    view: watch::Sender<RoundView>,
    wake: Arc<Notify>,
    subscriptions: Vec<Subscription>,
    answer_subscription: Option<Subscription>,
    participant_id: Option<Uuid>,
    retry: Backoff,
    poll: Option<ReinstatementPoll>,
    /// Elimination round the poll was started for; polling never restarts for the same one.
    polled_round: Option<u32>,
}

fn deadline(at: Option<Instant>) -> Sleep {
    sleep_until(at.unwrap_or_else(Instant::now))
}

impl RoundLifecycle {
    async fn run(
        mut self,
        run_id: Uuid,
        mut session: SessionContext,
        mut commands: mpsc::Receiver<Command>,
    ) {
        info!(
            contest_id = %self.contest_id,
            user_id = %self.user_id,
            "round lifecycle started"
        );
        self.refresh().await;

        loop {
            let retry_at = self.retry.next_at;
            let poll_at = self.poll.as_ref().map(|poll| poll.next_at);

            tokio::select! {
                _ = session.signed_out() => {
                    info!(
                        contest_id = %self.contest_id,
                        user_id = %self.user_id,
                        "session signed out; stopping round lifecycle"
                    );
                    break;
                }
                command = commands.recv() => match command {
                    Some(Command::Submit { selection, reply }) => {
                        let result = self.submit(session.current_user(), selection).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Stop) | None => {
                        info!(
                            contest_id = %self.contest_id,
                            user_id = %self.user_id,
                            "round lifecycle stopped"
                        );
                        break;
                    }
                },
                _ = self.wake.notified() => self.refresh().await,
                _ = deadline(retry_at), if retry_at.is_some() => {
                    self.retry.next_at = None;
                    self.refresh().await;
                }
                _ = deadline(poll_at), if poll_at.is_some() => self.poll_reinstatement().await,
            }
        }

        self.subscriptions.clear();
        self.answer_subscription = None;
        self.state
            .lifecycles()
            .remove_if(&(self.contest_id, self.user_id), |_, handle| {
                handle.run_id() == run_id
            });
    }

    async fn refresh(&mut self) {
        match self.reconcile().await {
            Ok(()) => self.retry.reset(),
            Err(err) if err.is_transient() => {
                let delay = self.retry.schedule();
                warn!(
                    contest_id = %self.contest_id,
                    user_id = %self.user_id,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "round lifecycle cannot reach storage; retrying"
                );
                self.publish_status(ViewStatus::Errored {
                    message: err.to_string(),
                });
            }
            Err(err) => {
                warn!(
                    contest_id = %self.contest_id,
                    user_id = %self.user_id,
                    error = %err,
                    "round lifecycle failed to reconcile"
                );
                self.publish_status(ViewStatus::Errored {
                    message: err.to_string(),
                });
            }
        }
    }

    async fn reconcile(&mut self) -> Result<(), ServiceError> {
        let repos = self.state.repositories().await?;
        self.ensure_subscribed(&repos);
        let matching = self.state.config().answer_matching;

        for _ in 0..MAX_RECONCILE_ATTEMPTS {
            let observation = self.observe(&repos).await?;
            self.ensure_answer_subscription(&repos);
            let derivation = derive(&observation, matching);

            match self.converge(&repos, &observation, derivation).await {
                Ok(()) => {
                    self.track_elimination();
                    self.publish_live(&observation);
                    return Ok(());
                }
                Err(ServiceError::Conflict(message)) => {
                    debug!(
                        contest_id = %self.contest_id,
                        user_id = %self.user_id,
                        %message,
                        "lost a concurrent write; reloading"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(ServiceError::Conflict(
            "participant kept changing while reconciling".into(),
        ))
    }

    fn ensure_subscribed(&mut self, repos: &Repositories) {
        if !self.subscriptions.is_empty() {
            return;
        }

        let contest_id = self.contest_id;
        let user_id = self.user_id;
        self.subscriptions = vec![
            repos.contests.subscribe(
                move |contest| contest.id == contest_id,
                waker(&self.wake),
            ),
            repos.participants.subscribe(
                move |participant| {
                    participant.contest_id == contest_id && participant.user_id == user_id
                },
                waker(&self.wake),
            ),
            repos.questions.subscribe(
                move |question| question.contest_id == contest_id,
                waker(&self.wake),
            ),
        ];
    }

    fn ensure_answer_subscription(&mut self, repos: &Repositories) {
        if self.answer_subscription.is_some() {
            return;
        }
        if let Some(participant_id) = self.participant_id {
            self.answer_subscription = Some(repos.answers.subscribe(
                move |answer| answer.participant_id == participant_id,
                waker(&self.wake),
            ));
        }
    }

    async fn observe(&mut self, repos: &Repositories) -> Result<Observation, ServiceError> {
        let contest = repos
            .contests
            .get(self.contest_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("contest `{}`", self.contest_id)))?;
        let participant = repos
            .participants
            .find_by_user(self.contest_id, self.user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("participant for this contest".into()))?;
        self.participant_id = Some(participant.id);

        let round = contest.current_round;
        let (question, answer) = if round == 0 {
            (None, None)
        } else {
            (
                repos.questions.for_round(contest.id, round).await?,
                repos
                    .answers
                    .for_participant(contest.id, participant.id, round)
                    .await?,
            )
        };

        Ok(Observation {
            contest,
            participant,
            question,
            answer,
        })
    }

    /// Walk the machine to the derived target, running the effects on the step that enters it.
    async fn converge(
        &mut self,
        repos: &Repositories,
        observation: &Observation,
        derivation: Derivation,
    ) -> Result<(), ServiceError> {
        let Derivation { target, effects } = derivation;

        if self.machine.state() == &target {
            if !effects.is_empty() {
                let resync = RoundEvent::Resync(target.clone());
                self.step(repos, observation, resync, &target, &effects)
                    .await?;
            }
            return Ok(());
        }

        let mut steps = 0;
        while let Some(event) = next_event(self.machine.state(), &target) {
            steps += 1;
            let event = if steps > MAX_STEPS {
                RoundEvent::Resync(target.clone())
            } else {
                event
            };
            self.step(repos, observation, event, &target, &effects).await?;
        }

        Ok(())
    }

    async fn step(
        &mut self,
        repos: &Repositories,
        observation: &Observation,
        event: RoundEvent,
        target: &RoundState,
        effects: &[Effect],
    ) -> Result<(), ServiceError> {
        let plan = match self.machine.plan(event) {
            Ok(plan) => plan,
            Err(PlanError::InvalidTransition(invalid)) => {
                debug!(
                    contest_id = %self.contest_id,
                    user_id = %self.user_id,
                    error = %invalid,
                    "no direct transition; resyncing"
                );
                self.machine.plan(RoundEvent::Resync(target.clone()))?
            }
            Err(err) => return Err(err.into()),
        };

        let work: &[Effect] = if &plan.to == target { effects } else { &[] };
        self.run_plan(plan, perform_effects(repos, observation, work))
            .await
            .map(|_| ())
    }

    /// Run `work` for a planned transition: apply on success, abort on error or timeout.
    async fn run_plan<Fut>(&mut self, plan: Plan, work: Fut) -> Result<RoundState, ServiceError>
    where
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let outcome = match timeout(DEFAULT_TRANSITION_TIMEOUT, work).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout),
        };

        match outcome {
            Ok(()) => {
                let next = self.machine.apply(plan.id)?;
                debug!(
                    contest_id = %self.contest_id,
                    user_id = %self.user_id,
                    from = plan.from.label(),
                    to = next.label(),
                    "round transition applied"
                );
                Ok(next)
            }
            Err(err) => {
                if let Err(abort_err) = self.machine.abort(plan.id) {
                    warn!(
                        event = ?plan.event,
                        plan_id = %plan.id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                Err(err)
            }
        }
    }

    async fn submit(
        &mut self,
        user: Option<CurrentUser>,
        selection: String,
    ) -> Result<RoundView, ServiceError> {
        let user = user.ok_or_else(|| ServiceError::Unauthorized("session signed out".into()))?;
        if selection.trim().is_empty() {
            return Err(ServiceError::Validation(
                "select an option before submitting".into(),
            ));
        }

        let repos = self.state.repositories().await?;
        let participant = repos
            .participants
            .find_by_user(self.contest_id, user.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("participant for this contest".into()))?;

        self.reconcile().await?;
        let observation = self.observe(&repos).await?;

        let RoundState::Answering { round, question_id } = self.machine.state().clone() else {
            return Err(ServiceError::InvalidState(format!(
                "cannot submit while {}",
                self.machine.state().label()
            )));
        };
        let question = observation
            .question
            .as_ref()
            .filter(|question| question.id == question_id)
            .ok_or_else(|| ServiceError::InvalidState("the round's question changed".into()))?;
        if !question.has_option(&selection) {
            return Err(ServiceError::Validation(format!(
                "`{selection}` is not one of the options"
            )));
        }

        let answer = Answer::new(self.contest_id, participant.id, round, Some(selection.clone()));
        let plan = self.machine.plan(RoundEvent::AnswerSubmitted { answer: selection })?;
        let answers = repos.answers.clone();
        self.run_plan(plan, async move {
            answers.insert(answer).await?;
            Ok(())
        })
        .await?;
        info!(
            contest_id = %self.contest_id,
            participant_id = %participant.id,
            round,
            "answer submitted"
        );

        self.reconcile().await?;
        Ok(self.view.borrow().clone())
    }

    fn track_elimination(&mut self) {
        match self.machine.state() {
            RoundState::Eliminated { round } => {
                let round = *round;
                if self.polled_round == Some(round) {
                    return;
                }
                self.polled_round = Some(round);
                let config = self.state.config();
                self.poll = (config.reinstatement_poll_attempts > 0).then(|| ReinstatementPoll {
                    remaining: config.reinstatement_poll_attempts,
                    next_at: Instant::now() + config.reinstatement_poll_interval,
                });
            }
            _ => {
                self.poll = None;
                self.polled_round = None;
            }
        }
    }

    async fn poll_reinstatement(&mut self) {
        let interval = self.state.config().reinstatement_poll_interval;
        let Some(poll) = self.poll.as_mut() else {
            return;
        };

        poll.remaining = poll.remaining.saturating_sub(1);
        if poll.remaining == 0 {
            info!(
                contest_id = %self.contest_id,
                user_id = %self.user_id,
                "reinstatement polling stopped after the last check"
            );
            self.poll = None;
        } else {
            poll.next_at = Instant::now() + interval;
        }

        self.refresh().await;
    }

    fn publish_live(&self, observation: &Observation) {
        self.view.send_replace(RoundView {
            status: ViewStatus::Live,
            state: self.machine.state().clone(),
            participant_id: Some(observation.participant.id),
            current_round: observation.contest.current_round,
            window: observation.contest.window(),
            question: observation.question.clone(),
            reinstatement_checks_left: self.poll.as_ref().map(|poll| poll.remaining),
        });
    }

    fn publish_status(&self, status: ViewStatus) {
        self.view.send_modify(|view| view.status = status);
    }
}

fn waker<T>(wake: &Arc<Notify>) -> impl FnMut(Delivery<T>) + Send + 'static {
    let wake = wake.clone();
    move |_| wake.notify_one()
}

async fn perform_effects(
    repos: &Repositories,
    observation: &Observation,
    effects: &[Effect],
) -> Result<(), ServiceError> {
    let contest_id = observation.contest.id;
    let participant = &observation.participant;

    for effect in effects {
        match *effect {
            Effect::RecordBlank { round } => {
                repos
                    .answers
                    .insert(Answer::new(contest_id, participant.id, round, None))
                    .await?;
                info!(
                    contest_id = %contest_id,
                    participant_id = %participant.id,
                    round,
                    "recorded blank answer after the window closed"
                );
            }
            Effect::Eliminate { round } => {
                repos
                    .participants
                    .update_status(
                        participant,
                        ParticipantStatus::Eliminated { round },
                        participant.reinstated_round,
                    )
                    .await?;
                info!(
                    contest_id = %contest_id,
                    participant_id = %participant.id,
                    round,
                    "participant eliminated"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            contest_store::memory::MemoryContestStore,
            repositories::{ContestPatch, ParticipantFilter},
        },
        dto::admin::QuestionRequest,
        services::admin_service,
        state::{
            AppState,
            contest::{Contest, Participant},
        },
    };

    struct Harness {
        state: SharedState,
        store: MemoryContestStore,
        repos: Repositories,
        contest: Contest,
        question: Question,
        user: CurrentUser,
    }

    impl Harness {
        async fn new() -> Self {
            let config = AppConfig {
                subscription_retry_initial: Duration::from_millis(10),
                subscription_retry_max: Duration::from_millis(40),
                reinstatement_poll_interval: Duration::from_millis(20),
                reinstatement_poll_attempts: 2,
                ..AppConfig::default()
            };
            let state = AppState::new(config);
            let store = MemoryContestStore::new();
            state.set_store(Arc::new(store.clone())).await;
            let repos = state.repositories().await.unwrap();

            let mut contest = Contest::new("Gridiron".into(), None);
            contest.current_round = 1;
            contest.submission_open = true;
            repos.contests.insert(contest.clone()).await.unwrap();

            let question = Question {
                id: Uuid::new_v4(),
                contest_id: contest.id,
                round: 1,
                text: "Worth six points?".into(),
                options: vec!["Touchdown".into(), "Punt".into()],
                correct_option: None,
                created_at: contest.created_at,
                updated_at: contest.created_at,
            };
            repos.questions.insert(question.clone()).await.unwrap();

            let user = CurrentUser {
                id: Uuid::new_v4(),
                display_name: "Ada".into(),
            };
            repos
                .participants
                .insert(Participant::new(contest.id, user.id, user.display_name.clone()))
                .await
                .unwrap();

            Self {
                state,
                store,
                repos,
                contest,
                question,
                user,
            }
        }

        fn spawn(&self) -> (watch::Sender<Option<CurrentUser>>, LifecycleHandle) {
            self.spawn_as(&self.user)
        }

        fn spawn_as(
            &self,
            user: &CurrentUser,
        ) -> (watch::Sender<Option<CurrentUser>>, LifecycleHandle) {
            let (session_tx, session) = SessionContext::fixed(user.clone());
            let handle = spawn(self.state.clone(), self.contest.id, user.clone(), session);
            (session_tx, handle)
        }

        async fn join(&self, display_name: &str) -> CurrentUser {
            let user = CurrentUser {
                id: Uuid::new_v4(),
                display_name: display_name.into(),
            };
            self.repos
                .participants
                .insert(Participant::new(self.contest.id, user.id, user.display_name.clone()))
                .await
                .unwrap();
            user
        }

        async fn question_for(&self, round: u32, correct_option: Option<&str>) -> Uuid {
            let request = QuestionRequest {
                round,
                text: "Worth six points?".into(),
                options: vec!["Touchdown".into(), "Punt".into()],
                correct_option: correct_option.map(Into::into),
            };
            admin_service::create_question(&self.state, self.contest.id, request)
                .await
                .unwrap()
                .id
        }

        async fn patch_contest(&self, patch: ContestPatch) {
            let current = self
                .repos
                .contests
                .get(self.contest.id)
                .await
                .unwrap()
                .unwrap();
            self.repos.contests.update(&current, &patch).await.unwrap();
        }

        async fn participant(&self) -> Participant {
            self.participant_of(&self.user).await
        }

        async fn participant_of(&self, user: &CurrentUser) -> Participant {
            self.repos
                .participants
                .find_by_user(self.contest.id, user.id)
                .await
                .unwrap()
                .unwrap()
        }

        async fn answers(&self) -> Vec<Answer> {
            self.repos.answers.list(self.contest.id, Some(1)).await.unwrap()
        }
    }

    async fn wait_for(handle: &LifecycleHandle, want: impl Fn(&RoundView) -> bool) -> RoundView {
        let mut view = handle.watch();
        timeout(Duration::from_secs(2), view.wait_for(|current| want(current)))
            .await
            .expect("view did not reach the expected state")
            .map(|view| view.clone())
            .unwrap()
    }

    fn in_state(state: RoundState) -> impl Fn(&RoundView) -> bool {
        move |view| view.status == ViewStatus::Live && view.state == state
    }

    #[tokio::test]
    async fn wrong_answer_is_eliminated_once_the_correct_option_is_published() {
        let harness = Harness::new().await;
        let (_session, handle) = harness.spawn();

        let answering = RoundState::Answering {
            round: 1,
            question_id: harness.question.id,
        };
        wait_for(&handle, in_state(answering)).await;

        let view = handle.submit("Punt".into()).await.unwrap();
        assert_eq!(
            view.state,
            RoundState::Submitted {
                round: 1,
                answer: "Punt".into()
            }
        );

        let mut judged = harness.question.clone();
        judged.correct_option = Some("Touchdown".into());
        harness.repos.questions.update(judged).await.unwrap();

        wait_for(&handle, in_state(RoundState::Eliminated { round: 1 })).await;
        let participant = harness.participant().await;
        assert_eq!(participant.status, ParticipantStatus::Eliminated { round: 1 });
        assert_eq!(harness.answers().await.len(), 1);
    }

    #[tokio::test]
    async fn right_answer_survives_and_waits_for_the_next_round() {
        let harness = Harness::new().await;
        let (_session, handle) = harness.spawn();
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;

        handle.submit("Touchdown".into()).await.unwrap();
        let mut judged = harness.question.clone();
        judged.correct_option = Some("Touchdown".into());
        harness.repos.questions.update(judged).await.unwrap();
        wait_for(&handle, in_state(RoundState::Correct { round: 1 })).await;

        harness
            .patch_contest(ContestPatch {
                submission_open: Some(false),
                current_round: Some(2),
                ..ContestPatch::default()
            })
            .await;
        wait_for(&handle, in_state(RoundState::AwaitingRound { round: 2 })).await;
        assert!(harness.participant().await.status.is_active());
    }

    #[tokio::test]
    async fn closing_the_window_records_exactly_one_blank() {
        let harness = Harness::new().await;
        let (_session, handle) = harness.spawn();
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;

        harness
            .patch_contest(ContestPatch {
                submission_open: Some(false),
                closed_round: Some(1),
                ..ContestPatch::default()
            })
            .await;
        wait_for(&handle, in_state(RoundState::Eliminated { round: 1 })).await;

        // Further wake-ups must not write a second blank.
        harness
            .patch_contest(ContestPatch {
                lobby_open: Some(true),
                ..ContestPatch::default()
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let answers = harness.answers().await;
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, None);
        let participant = harness.participant().await;
        assert_eq!(participant.status, ParticipantStatus::Eliminated { round: 1 });
    }

    #[tokio::test]
    async fn reinstated_participant_resumes_in_the_current_round() {
        let harness = Harness::new().await;
        let (_session, handle) = harness.spawn();
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;
        harness
            .patch_contest(ContestPatch {
                submission_open: Some(false),
                closed_round: Some(1),
                ..ContestPatch::default()
            })
            .await;
        wait_for(&handle, in_state(RoundState::Eliminated { round: 1 })).await;

        let participant = harness.participant().await;
        harness
            .repos
            .participants
            .update_status(&participant, ParticipantStatus::Active, Some(1))
            .await
            .unwrap();
        wait_for(&handle, in_state(RoundState::Correct { round: 1 })).await;

        let eliminated = harness
            .repos
            .participants
            .list(harness.contest.id, ParticipantFilter::Eliminated)
            .await
            .unwrap();
        assert!(eliminated.is_empty());
    }

    #[tokio::test]
    async fn reinstated_in_a_later_round_can_still_be_eliminated() {
        let harness = Harness::new().await;
        let contest_id = harness.contest.id;
        let (_session, handle) = harness.spawn();
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;

        handle.submit("Punt".into()).await.unwrap();
        admin_service::set_correct_option(&harness.state, harness.question.id, "Touchdown".into())
            .await
            .unwrap();
        wait_for(&handle, in_state(RoundState::Eliminated { round: 1 })).await;

        admin_service::set_round(&harness.state, contest_id, 2).await.unwrap();
        let response = admin_service::reinstate_participants(&harness.state, contest_id, 1)
            .await
            .unwrap();
        assert_eq!(response.reinstated, 1);
        assert_eq!(harness.participant().await.reinstated_round, None);
        wait_for(&handle, in_state(RoundState::AwaitingRound { round: 2 })).await;

        let question_id = harness.question_for(2, Some("Touchdown")).await;
        admin_service::set_submission_open(&harness.state, contest_id, true)
            .await
            .unwrap();
        wait_for(
            &handle,
            in_state(RoundState::Answering {
                round: 2,
                question_id,
            }),
        )
        .await;

        handle.submit("Punt".into()).await.unwrap();
        wait_for(&handle, in_state(RoundState::Eliminated { round: 2 })).await;
        let participant = harness.participant().await;
        assert_eq!(participant.status, ParticipantStatus::Eliminated { round: 2 });
    }

    #[tokio::test]
    async fn round_increment_moves_only_survivors_forward() {
        let harness = Harness::new().await;
        let contest_id = harness.contest.id;
        let grace = harness.join("Grace").await;
        let (_ada_session, ada) = harness.spawn();
        let (_grace_session, grace_handle) = harness.spawn_as(&grace);

        for handle in [&ada, &grace_handle] {
            wait_for(handle, |view| matches!(view.state, RoundState::Answering { .. })).await;
            handle.submit("Touchdown".into()).await.unwrap();
        }
        admin_service::set_correct_option(&harness.state, harness.question.id, "Touchdown".into())
            .await
            .unwrap();
        for handle in [&ada, &grace_handle] {
            wait_for(handle, in_state(RoundState::Correct { round: 1 })).await;
        }

        admin_service::set_round(&harness.state, contest_id, 2).await.unwrap();
        let question_id = harness.question_for(2, None).await;
        admin_service::set_submission_open(&harness.state, contest_id, true)
            .await
            .unwrap();
        let answering = RoundState::Answering {
            round: 2,
            question_id,
        };
        for handle in [&ada, &grace_handle] {
            wait_for(handle, in_state(answering.clone())).await;
        }
        ada.submit("Touchdown".into()).await.unwrap();
        grace_handle.submit("Punt".into()).await.unwrap();
        admin_service::set_correct_option(&harness.state, question_id, "Touchdown".into())
            .await
            .unwrap();
        wait_for(&ada, in_state(RoundState::Correct { round: 2 })).await;
        wait_for(&grace_handle, in_state(RoundState::Eliminated { round: 2 })).await;

        admin_service::set_round(&harness.state, contest_id, 3).await.unwrap();
        wait_for(&ada, in_state(RoundState::AwaitingRound { round: 3 })).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            grace_handle.watch().borrow().state,
            RoundState::Eliminated { round: 2 }
        );

        assert!(harness.participant().await.status.is_active());
        assert_eq!(
            harness.participant_of(&grace).await.status,
            ParticipantStatus::Eliminated { round: 2 }
        );
        let round_two = harness.repos.answers.list(contest_id, Some(2)).await.unwrap();
        assert_eq!(round_two.len(), 2);
        assert!(round_two.iter().all(|answer| answer.answer.is_some()));
    }

    #[tokio::test]
    async fn invalid_selections_are_rejected() {
        let harness = Harness::new().await;
        let (_session, handle) = harness.spawn();
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;

        let err = handle.submit("  ".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = handle.submit("Field goal".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(harness.answers().await.is_empty());
    }

    #[tokio::test]
    async fn storage_outage_is_retried_until_it_recovers() {
        let harness = Harness::new().await;
        harness.store.set_offline(true);
        let (_session, handle) = harness.spawn();

        wait_for(&handle, |view| matches!(view.status, ViewStatus::Errored { .. })).await;
        harness.store.set_offline(false);
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;
    }

    #[tokio::test]
    async fn reinstatement_poll_is_bounded() {
        let harness = Harness::new().await;
        let (_session, handle) = harness.spawn();
        wait_for(&handle, |view| matches!(view.state, RoundState::Answering { .. })).await;
        harness
            .patch_contest(ContestPatch {
                submission_open: Some(false),
                closed_round: Some(1),
                ..ContestPatch::default()
            })
            .await;

        let view = wait_for(&handle, in_state(RoundState::Eliminated { round: 1 })).await;
        assert!(view.reinstatement_checks_left.is_some());
        wait_for(&handle, |view| {
            view.state.is_eliminated() && view.reinstatement_checks_left.is_none()
        })
        .await;
    }

    #[tokio::test]
    async fn sign_out_stops_the_lifecycle() {
        let harness = Harness::new().await;
        let (session, handle) = harness.spawn();
        wait_for(&handle, |view| view.status == ViewStatus::Live).await;

        session.send(None).unwrap();
        timeout(Duration::from_secs(1), async {
            while handle.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            handle.submit("Punt".into()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
