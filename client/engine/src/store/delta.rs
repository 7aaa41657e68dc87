use crate::models::{
    Assignment, AssignmentDraftSession, BookmarkedQuestion, Category, ExamSession, HistoryRecord,
    Subject, SubjectAverage, User,
};

use super::ViewName;

/// Partial state update, merged key-wise by `StateStore::update`.
///
/// Nullable fields are `Option<Option<T>>`: the outer `None` means "leave
/// untouched", `Some(None)` means "clear". The distinction matters for the
/// exam teardown rule, where a caller may or may not supply a replacement
/// session.
#[derive(Default)]
pub struct StateDelta {
    pub current_view: Option<ViewName>,
    pub current_user: Option<Option<User>>,
    pub subjects: Option<Vec<Subject>>,
    pub categories: Option<Vec<Category>>,
    pub assignments: Option<Vec<Assignment>>,
    pub exam_session: Option<Option<ExamSession>>,
    pub assignment_session: Option<Option<AssignmentDraftSession>>,
    pub exam_history: Option<Vec<HistoryRecord>>,
    pub subject_averages: Option<Vec<SubjectAverage>>,
    pub viewed_student_id: Option<Option<String>>,
    pub viewed_student_history: Option<Vec<HistoryRecord>>,
    pub viewed_subject_averages: Option<Vec<SubjectAverage>>,
    pub bookmarks: Option<Vec<BookmarkedQuestion>>,
    pub selected_subject: Option<Option<String>>,
    pub selected_category: Option<Option<String>>,
    pub selected_admin_subject: Option<Option<String>>,
    pub selected_admin_category: Option<Option<String>>,
    pub last_result: Option<Option<HistoryRecord>>,
    pub review_record: Option<Option<HistoryRecord>>,
    pub notice: Option<Option<String>>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, view: ViewName) -> Self {
        self.current_view = Some(view);
        self
    }

    pub fn user(mut self, user: Option<User>) -> Self {
        self.current_user = Some(user);
        self
    }

    pub fn subjects(mut self, subjects: Vec<Subject>) -> Self {
        self.subjects = Some(subjects);
        self
    }

    pub fn categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn assignments(mut self, assignments: Vec<Assignment>) -> Self {
        self.assignments = Some(assignments);
        self
    }

    pub fn exam_session(mut self, session: Option<ExamSession>) -> Self {
        self.exam_session = Some(session);
        self
    }

    pub fn assignment_session(mut self, session: Option<AssignmentDraftSession>) -> Self {
        self.assignment_session = Some(session);
        self
    }

    pub fn exam_history(mut self, records: Vec<HistoryRecord>) -> Self {
        self.exam_history = Some(records);
        self
    }

    pub fn subject_averages(mut self, averages: Vec<SubjectAverage>) -> Self {
        self.subject_averages = Some(averages);
        self
    }

    pub fn viewed_student_id(mut self, id: Option<String>) -> Self {
        self.viewed_student_id = Some(id);
        self
    }

    pub fn viewed_student_history(mut self, records: Vec<HistoryRecord>) -> Self {
        self.viewed_student_history = Some(records);
        self
    }

    pub fn viewed_subject_averages(mut self, averages: Vec<SubjectAverage>) -> Self {
        self.viewed_subject_averages = Some(averages);
        self
    }

    pub fn bookmarks(mut self, bookmarks: Vec<BookmarkedQuestion>) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }

    pub fn selected_subject(mut self, id: Option<String>) -> Self {
        self.selected_subject = Some(id);
        self
    }

    pub fn selected_category(mut self, id: Option<String>) -> Self {
        self.selected_category = Some(id);
        self
    }

    pub fn selected_admin_subject(mut self, id: Option<String>) -> Self {
        self.selected_admin_subject = Some(id);
        self
    }

    pub fn selected_admin_category(mut self, id: Option<String>) -> Self {
        self.selected_admin_category = Some(id);
        self
    }

    pub fn last_result(mut self, record: Option<HistoryRecord>) -> Self {
        self.last_result = Some(record);
        self
    }

    pub fn review_record(mut self, record: Option<HistoryRecord>) -> Self {
        self.review_record = Some(record);
        self
    }

    pub fn notice(mut self, notice: Option<String>) -> Self {
        self.notice = Some(notice);
        self
    }
}
