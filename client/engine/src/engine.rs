use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::commands::Command;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{Collection, RemoteStoreGateway};
use crate::models::{Assignment, Category, Question, Subject, User};
use crate::services::{
    AssignmentService, AutoConfirm, ConfirmGate, ExamService, HistoryService, ReviewEntry,
    SnapshotEvent, SubscriptionManager, SubscriptionScope,
};
use crate::store::{AppMode, AppState, StateDelta, StateStore, TickOutcome, ViewName};
use crate::timer::TimerEvent;

/// Everything that reaches the engine asynchronously: countdown ticks and
/// subscription snapshots. Both funnel through one channel so they are
/// applied on the engine's logical thread, never concurrently with a
/// command.
#[derive(Debug)]
pub enum EngineEvent {
    Timer(TimerEvent),
    Snapshot(SnapshotEvent),
}

/// The application core. Owns the state store, the services, and the event
/// channel; the rendering layer drives it exclusively through `dispatch`
/// and reads back through `state` / `observe`.
pub struct Engine {
    config: EngineConfig,
    store: StateStore,
    gateway: Arc<dyn RemoteStoreGateway>,
    subscriptions: SubscriptionManager,
    exams: ExamService,
    assignments: AssignmentService,
    history: HistoryService,
    events_tx: UnboundedSender<EngineEvent>,
    events_rx: UnboundedReceiver<EngineEvent>,
    /// Per-question breakdown of the record last opened for review.
    last_review: Vec<ReviewEntry>,
}

impl Engine {
    pub fn new(config: EngineConfig, gateway: Arc<dyn RemoteStoreGateway>) -> Self {
        Self::with_confirm_gate(config, gateway, Arc::new(AutoConfirm))
    }

    pub fn with_confirm_gate(
        config: EngineConfig,
        gateway: Arc<dyn RemoteStoreGateway>,
        gate: Arc<dyn ConfirmGate>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let subscriptions = SubscriptionManager::new(gateway.clone(), events_tx.clone());
        let exams = ExamService::new(gateway.clone(), config.default_time_limit_minutes);
        let assignments = AssignmentService::new(gateway.clone());
        let history = HistoryService::new(gateway.clone(), gate, config.optimistic_deletes);

        Self {
            config,
            store: StateStore::new(),
            gateway,
            subscriptions,
            exams,
            assignments,
            history,
            events_tx,
            events_rx,
            last_review: Vec::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        self.store.state()
    }

    pub fn review_entries(&self) -> &[ReviewEntry] {
        &self.last_review
    }

    pub fn observe(&mut self, observer: impl FnMut(&AppState) + Send + 'static) {
        self.store.observe(observer);
    }

    pub fn observe_timer(&mut self, observer: impl FnMut(u32) + Send + 'static) {
        self.store.observe_timer(observer);
    }

    /// Loads the static catalog (subjects, categories, assignments) into the
    /// store. Run once before the first command.
    pub async fn bootstrap(&mut self) -> EngineResult<()> {
        let subjects = self.load_all::<Subject>(Collection::Subjects).await?;
        let categories = self.load_all::<Category>(Collection::Categories).await?;
        let assignments = self.load_all::<Assignment>(Collection::Assignments).await?;

        tracing::info!(
            subjects = subjects.len(),
            categories = categories.len(),
            assignments = assignments.len(),
            "catalog loaded"
        );
        self.store.update(
            StateDelta::new()
                .subjects(subjects)
                .categories(categories)
                .assignments(assignments),
        );
        Ok(())
    }

    /// Runs one command, then applies every event it produced before
    /// returning. State reads after `dispatch` therefore see a settled
    /// snapshot.
    pub async fn dispatch(&mut self, command: Command) -> EngineResult<()> {
        tracing::debug!(?command, "dispatching");
        let result = self.handle_command(command).await;
        self.drain_events().await;
        result
    }

    async fn handle_command(&mut self, command: Command) -> EngineResult<()> {
        match command {
            Command::ShowView(view) => {
                self.store.update(StateDelta::new().view(view));
                Ok(())
            }
            Command::Login { name } => self.login(&name).await,
            Command::Logout => {
                self.logout();
                Ok(())
            }

            Command::SelectSubject(id) => {
                self.store.update(StateDelta::new().selected_subject(id));
                Ok(())
            }
            Command::SelectCategory(id) => {
                self.store.update(StateDelta::new().selected_category(id));
                Ok(())
            }
            Command::SelectAdminSubject(id) => {
                self.store
                    .update(StateDelta::new().selected_admin_subject(id));
                Ok(())
            }
            Command::SelectAdminCategory(id) => {
                self.store
                    .update(StateDelta::new().selected_admin_category(id));
                Ok(())
            }

            Command::StartExam {
                subject_id,
                category_id,
            } => {
                let tick_interval = Duration::from_millis(self.config.tick_interval_ms);
                self.exams
                    .start(
                        &mut self.store,
                        &self.events_tx,
                        tick_interval,
                        &subject_id,
                        &category_id,
                    )
                    .await
            }
            Command::SelectAnswer {
                question_id,
                option_index,
            } => {
                self.exams
                    .select_answer(&mut self.store, &question_id, option_index);
                Ok(())
            }
            Command::NextQuestion => {
                self.exams.navigate(&mut self.store, 1);
                Ok(())
            }
            Command::PreviousQuestion => {
                self.exams.navigate(&mut self.store, -1);
                Ok(())
            }
            Command::JumpToQuestion(index) => {
                self.exams.jump(&mut self.store, index);
                Ok(())
            }
            Command::FinishExam => self.finish_exam().await,
            Command::AbandonExam => {
                self.exams.abandon(&mut self.store);
                Ok(())
            }
            Command::OpenReview { record_id } => self.open_review(&record_id).await,

            Command::BookmarkQuestion { question_id } => {
                let question = self
                    .find_question(&question_id)
                    .ok_or_else(|| EngineError::not_found("question", &question_id))?;
                self.history.add_bookmark(&mut self.store, &question).await
            }
            Command::RemoveBookmark { bookmark_id } => {
                self.history
                    .remove_bookmark(&mut self.store, &bookmark_id)
                    .await
                    .map(|_| ())
            }
            Command::ShowBookmarks => self.history.show_bookmarks(&mut self.store).await,
            Command::DeleteHistoryRecord { record_id } => self
                .history
                .delete_record(&mut self.store, &record_id)
                .await
                .map(|_| ()),

            Command::OpenAssignment { assignment_id } => {
                self.assignments.open(&mut self.store, &assignment_id).await
            }
            Command::SetAssignmentAnswer { index, content } => {
                self.assignments.set_answer(&mut self.store, index, content)
            }
            Command::SaveAssignmentDraft => self.assignments.save_draft(&mut self.store).await,
            Command::SubmitAssignment => self.assignments.submit(&mut self.store).await,
            Command::GradeSubmission {
                submission_id,
                score,
                feedback,
            } => {
                self.assignments
                    .grade(&mut self.store, &submission_id, score, feedback)
                    .await
            }

            Command::ViewStudentAnalytics { student_id } => {
                self.view_student_analytics(&student_id).await
            }
        }
    }

    /// Applies every queued event. Called after each command; tests also
    /// feed synthetic events through `handle_event` directly.
    pub async fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Timer(timer) => self.handle_timer(timer).await,
            EngineEvent::Snapshot(snapshot) => {
                self.subscriptions.apply_snapshot(&mut self.store, snapshot);
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        let current = self
            .store
            .state()
            .exam_session
            .as_ref()
            .map(|session| session.id);
        if current != Some(event.session_id()) {
            tracing::debug!(session = %event.session_id(), "tick for a stale session ignored");
            return;
        }

        let expired = match event {
            TimerEvent::TimerTick(_) => self.store.tick_exam() == TickOutcome::Expired,
            TimerEvent::TimeExpired(_) => true,
        };
        if expired {
            // the countdown finishes the exam; a persistence miss is already
            // surfaced to the user as a notice, so it is only logged here
            if let Err(err) = self.finish_exam().await {
                tracing::warn!(error = %err, "timer-driven finish could not persist the result");
            }
        }
    }

    /// Scores and terminates the running session, then persists the record.
    /// No-op when no session is in progress, which makes a timer expiry
    /// racing a manual finish harmless.
    async fn finish_exam(&mut self) -> EngineResult<()> {
        let Some(record) = self.exams.finish(&mut self.store) else {
            return Ok(());
        };
        self.exams.persist_history(&mut self.store, &record).await
    }

    async fn login(&mut self, name: &str) -> EngineResult<()> {
        let user = self
            .gateway
            .query_where(Collection::Users, "name", json!(name))
            .await
            .map_err(EngineError::remote)?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("user", name))?
            .decode::<User>()
            .map_err(EngineError::remote)?;

        tracing::info!(user = %user.id, name = %user.name, "logged in");
        let user_id = user.id.clone();
        self.store
            .update(StateDelta::new().user(Some(user)).view(ViewName::Home));

        // lives for the whole login, not bound to any view
        self.subscriptions
            .subscribe_history(SubscriptionScope::SelfHistory, &user_id)
            .await
    }

    fn logout(&mut self) {
        // moving to the login view first tears down any mode-scoped
        // resources (exam timer, admin analytics subscription)
        self.store.update(
            StateDelta::new()
                .view(ViewName::Login)
                .user(None)
                .exam_history(Vec::new())
                .subject_averages(Vec::new())
                .bookmarks(Vec::new())
                .selected_subject(None)
                .selected_admin_subject(None)
                .last_result(None)
                .review_record(None)
                .notice(None),
        );
        self.subscriptions.cancel_all();
        self.last_review.clear();
        tracing::info!("logged out");
    }

    async fn open_review(&mut self, record_id: &str) -> EngineResult<()> {
        let record = self
            .store
            .state()
            .exam_history
            .iter()
            .find(|record| record.id == record_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("history record", record_id))?;

        self.last_review = self.exams.load_review(&record).await?;
        self.store.update(
            StateDelta::new()
                .view(ViewName::ExamReview)
                .review_record(Some(record)),
        );
        Ok(())
    }

    async fn view_student_analytics(&mut self, student_id: &str) -> EngineResult<()> {
        let is_admin = self
            .store
            .state()
            .current_user
            .as_ref()
            .map(User::is_admin)
            .unwrap_or(false);
        if !is_admin {
            return Err(EngineError::ValidationFailed(
                "student analytics require the admin role".into(),
            ));
        }

        // replace-not-stack: switching students reuses the single scope slot
        self.subscriptions
            .subscribe_history(SubscriptionScope::AdminViewedStudentHistory, student_id)
            .await?;

        self.store.update(
            StateDelta::new()
                .view(ViewName::AdminAnalytics)
                .viewed_student_id(Some(student_id.to_string())),
        );
        if let Some(guard) = self
            .subscriptions
            .guard(SubscriptionScope::AdminViewedStudentHistory)
        {
            self.store.acquire(AppMode::AdminAnalytics, guard);
        }
        Ok(())
    }

    fn find_question(&self, question_id: &str) -> Option<Question> {
        self.last_review
            .iter()
            .map(|entry| &entry.question)
            .find(|question| question.id == question_id)
            .cloned()
            .or_else(|| {
                self.store.state().exam_session.as_ref().and_then(|session| {
                    session
                        .questions
                        .iter()
                        .find(|question| question.id == question_id)
                        .cloned()
                })
            })
    }

    async fn load_all<T: serde::de::DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> EngineResult<Vec<T>> {
        self.gateway
            .read_all(collection)
            .await
            .map_err(EngineError::remote)?
            .iter()
            .map(|record| record.decode::<T>().map_err(EngineError::remote))
            .collect()
    }

    /// Tears the engine down: cancels subscriptions, disposes scoped
    /// resources, and resets the state.
    pub fn dispose(&mut self) {
        self.subscriptions.cancel_all();
        self.store.dispose();
        self.last_review.clear();
        tracing::info!("engine disposed");
    }
}
