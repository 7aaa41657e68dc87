use crate::store::ViewName;

/// Explicit command surface for the rendering layer. Every UI interaction
/// maps to one of these; `Engine::dispatch` routes them to handlers, so no
/// handler is ever reached through a shared global registry.
#[derive(Debug, Clone)]
pub enum Command {
    ShowView(ViewName),
    Login { name: String },
    Logout,

    SelectSubject(Option<String>),
    SelectCategory(Option<String>),
    SelectAdminSubject(Option<String>),
    SelectAdminCategory(Option<String>),

    StartExam { subject_id: String, category_id: String },
    SelectAnswer { question_id: String, option_index: usize },
    NextQuestion,
    PreviousQuestion,
    JumpToQuestion(usize),
    FinishExam,
    AbandonExam,
    OpenReview { record_id: String },

    BookmarkQuestion { question_id: String },
    RemoveBookmark { bookmark_id: String },
    ShowBookmarks,
    DeleteHistoryRecord { record_id: String },

    OpenAssignment { assignment_id: String },
    SetAssignmentAnswer { index: usize, content: String },
    SaveAssignmentDraft,
    SubmitAssignment,
    GradeSubmission { submission_id: String, score: u32, feedback: String },

    ViewStudentAnalytics { student_id: String },
}
