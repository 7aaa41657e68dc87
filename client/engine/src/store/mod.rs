use serde::{Deserialize, Serialize};

use crate::models::{
    Assignment, AssignmentDraftSession, BookmarkedQuestion, Category, ExamPhase, ExamSession,
    HistoryRecord, Subject, SubjectAverage, User,
};

pub mod delta;
pub mod scope;

pub use delta::StateDelta;
pub use scope::{AppMode, ModeScopes, ScopedResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewName {
    Login,
    Home,
    ExamSetup,
    ExamTaking,
    ExamResult,
    ExamReview,
    History,
    Bookmarks,
    Assignments,
    AssignmentWork,
    AdminDashboard,
    AdminAnalytics,
}

impl ViewName {
    /// The mode whose scoped resources this view owns, if any.
    pub fn owning_mode(self) -> Option<AppMode> {
        match self {
            ViewName::ExamTaking => Some(AppMode::ExamTaking),
            ViewName::AssignmentWork => Some(AppMode::AssignmentWork),
            ViewName::AdminAnalytics => Some(AppMode::AdminAnalytics),
            _ => None,
        }
    }
}

/// The single source of truth. Only ever mutated through
/// `StateStore::update` (plus the localized timer path).
#[derive(Debug)]
pub struct AppState {
    pub current_view: ViewName,
    pub current_user: Option<User>,
    pub subjects: Vec<Subject>,
    pub categories: Vec<Category>,
    pub assignments: Vec<Assignment>,
    pub exam_session: Option<ExamSession>,
    pub assignment_session: Option<AssignmentDraftSession>,
    /// Self exam history, date descending. Mirrored by the self-history
    /// subscription; optimistic edits are provisional until the next
    /// snapshot.
    pub exam_history: Vec<HistoryRecord>,
    pub subject_averages: Vec<SubjectAverage>,
    pub viewed_student_id: Option<String>,
    pub viewed_student_history: Vec<HistoryRecord>,
    pub viewed_subject_averages: Vec<SubjectAverage>,
    pub bookmarks: Vec<BookmarkedQuestion>,
    pub selected_subject: Option<String>,
    pub selected_category: Option<String>,
    pub selected_admin_subject: Option<String>,
    pub selected_admin_category: Option<String>,
    pub last_result: Option<HistoryRecord>,
    pub review_record: Option<HistoryRecord>,
    pub notice: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            current_view: ViewName::Login,
            current_user: None,
            subjects: Vec::new(),
            categories: Vec::new(),
            assignments: Vec::new(),
            exam_session: None,
            assignment_session: None,
            exam_history: Vec::new(),
            subject_averages: Vec::new(),
            viewed_student_id: None,
            viewed_student_history: Vec::new(),
            viewed_subject_averages: Vec::new(),
            bookmarks: Vec::new(),
            selected_subject: None,
            selected_category: None,
            selected_admin_subject: None,
            selected_admin_category: None,
            last_result: None,
            review_record: None,
            notice: None,
        }
    }
}

type Observer = Box<dyn FnMut(&AppState) + Send>;
type TimerObserver = Box<dyn FnMut(u32) + Send>;

/// Outcome of a localized countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No running exam session; the tick was stale.
    Idle,
    Running(u32),
    /// The countdown reached zero; the caller must finish the session now.
    Expired,
}

pub struct StateStore {
    state: AppState,
    observers: Vec<Observer>,
    timer_observers: Vec<TimerObserver>,
    scopes: ModeScopes,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            state: AppState::default(),
            observers: Vec::new(),
            timer_observers: Vec::new(),
            scopes: ModeScopes::default(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Registers a full-state observer, notified exactly once per `update`.
    pub fn observe(&mut self, observer: impl FnMut(&AppState) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Registers a countdown observer, notified on ticks only. Keeps the
    /// 1 Hz countdown from broadcasting the whole state every second.
    pub fn observe_timer(&mut self, observer: impl FnMut(u32) + Send + 'static) {
        self.timer_observers.push(Box::new(observer));
    }

    /// Binds a disposable resource to a mode; it is disposed when the view
    /// leaves that mode (or on `dispose`).
    pub fn acquire(&mut self, mode: AppMode, resource: Box<dyn ScopedResource>) {
        self.scopes.acquire(mode, resource);
    }

    pub fn dispose_mode(&mut self, mode: AppMode) {
        self.scopes.dispose_mode(mode);
    }

    /// Merges `delta` into the state and notifies observers exactly once.
    /// Side-effect rules run against the delta before the merge; the
    /// `&mut self` receiver makes a re-entrant update unrepresentable.
    pub fn update(&mut self, mut delta: StateDelta) {
        self.apply_side_effects(&mut delta);
        self.merge(delta);
        self.notify();
    }

    fn apply_side_effects(&mut self, delta: &mut StateDelta) {
        if let Some(next_view) = delta.current_view {
            if next_view != self.state.current_view {
                if let Some(mode) = self.state.current_view.owning_mode() {
                    self.scopes.dispose_mode(mode);
                    match mode {
                        AppMode::ExamTaking => {
                            if let Some(timer) = self
                                .state
                                .exam_session
                                .as_ref()
                                .and_then(|s| s.timer.as_ref())
                            {
                                if timer.cancel() {
                                    tracing::info!("exam timer cancelled on view change");
                                }
                            }
                            // the session dies with its view unless the
                            // caller supplied a replacement
                            if delta.exam_session.is_none() {
                                delta.exam_session = Some(None);
                            }
                        }
                        AppMode::AssignmentWork => {
                            if delta.assignment_session.is_none() {
                                delta.assignment_session = Some(None);
                            }
                        }
                        AppMode::AdminAnalytics => {
                            if delta.viewed_student_id.is_none() {
                                delta.viewed_student_id = Some(None);
                            }
                            if delta.viewed_student_history.is_none() {
                                delta.viewed_student_history = Some(Vec::new());
                            }
                            if delta.viewed_subject_averages.is_none() {
                                delta.viewed_subject_averages = Some(Vec::new());
                            }
                        }
                    }
                }
            }
        }

        // dependent selectors must never reference a stale parent
        if let Some(subject) = &delta.selected_subject {
            if *subject != self.state.selected_subject && delta.selected_category.is_none() {
                delta.selected_category = Some(None);
            }
        }
        if let Some(subject) = &delta.selected_admin_subject {
            if *subject != self.state.selected_admin_subject
                && delta.selected_admin_category.is_none()
            {
                delta.selected_admin_category = Some(None);
            }
        }
    }

    fn merge(&mut self, delta: StateDelta) {
        let state = &mut self.state;
        if let Some(view) = delta.current_view {
            state.current_view = view;
        }
        if let Some(user) = delta.current_user {
            state.current_user = user;
        }
        if let Some(subjects) = delta.subjects {
            state.subjects = subjects;
        }
        if let Some(categories) = delta.categories {
            state.categories = categories;
        }
        if let Some(assignments) = delta.assignments {
            state.assignments = assignments;
        }
        if let Some(session) = delta.exam_session {
            state.exam_session = session;
        }
        if let Some(session) = delta.assignment_session {
            state.assignment_session = session;
        }
        if let Some(records) = delta.exam_history {
            state.exam_history = records;
        }
        if let Some(averages) = delta.subject_averages {
            state.subject_averages = averages;
        }
        if let Some(id) = delta.viewed_student_id {
            state.viewed_student_id = id;
        }
        if let Some(records) = delta.viewed_student_history {
            state.viewed_student_history = records;
        }
        if let Some(averages) = delta.viewed_subject_averages {
            state.viewed_subject_averages = averages;
        }
        if let Some(bookmarks) = delta.bookmarks {
            state.bookmarks = bookmarks;
        }
        if let Some(id) = delta.selected_subject {
            state.selected_subject = id;
        }
        if let Some(id) = delta.selected_category {
            state.selected_category = id;
        }
        if let Some(id) = delta.selected_admin_subject {
            state.selected_admin_subject = id;
        }
        if let Some(id) = delta.selected_admin_category {
            state.selected_admin_category = id;
        }
        if let Some(record) = delta.last_result {
            state.last_result = record;
        }
        if let Some(record) = delta.review_record {
            state.review_record = record;
        }
        if let Some(notice) = delta.notice {
            state.notice = notice;
        }
    }

    fn notify(&mut self) {
        let state = &self.state;
        for observer in &mut self.observers {
            observer(state);
        }
    }

    /// Localized countdown tick: decrements the running exam session and
    /// notifies timer observers only. Never a full-state broadcast.
    pub fn tick_exam(&mut self) -> TickOutcome {
        let Some(session) = self.state.exam_session.as_mut() else {
            return TickOutcome::Idle;
        };
        if session.phase != ExamPhase::InProgress {
            return TickOutcome::Idle;
        }
        session.time_left_seconds = session.time_left_seconds.saturating_sub(1);
        let left = session.time_left_seconds;
        for observer in &mut self.timer_observers {
            observer(left);
        }
        if left == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Running(left)
        }
    }

    /// Tears down every scoped resource and resets the state. The store is
    /// reusable afterwards but empty.
    pub fn dispose(&mut self) {
        if let Some(timer) = self
            .state
            .exam_session
            .as_ref()
            .and_then(|s| s.timer.as_ref())
        {
            timer.cancel();
        }
        self.scopes.dispose_all();
        self.state = AppState::default();
    }
}
