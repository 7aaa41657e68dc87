use std::collections::HashMap;

use uuid::Uuid;

use crate::timer::TimerHandle;

pub mod assignment;
pub mod history;
pub mod question;
pub mod user;

pub use assignment::{
    Assignment, AssignmentAnswer, AssignmentQuestion, AssignmentSubmission, SubmissionStatus,
};
pub use history::{HistoryRecord, SubjectAverage};
pub use question::{BookmarkedQuestion, Category, Question, Subject};
pub use user::{User, UserRole};

/// Live timed exam. Transient and disposable; the durable outcome is the
/// `HistoryRecord` produced on finish.
#[derive(Debug, Clone)]
pub struct ExamSession {
    pub id: Uuid,
    pub subject: Subject,
    pub category: Category,
    /// Shuffled presentation order.
    pub questions: Vec<Question>,
    /// question id -> selected option index. Insertion order irrelevant.
    pub answers: HashMap<String, usize>,
    pub current_index: usize,
    pub time_left_seconds: u32,
    pub phase: ExamPhase,
    /// Owned by the session; cancelled exactly once (idempotent handle).
    pub timer: Option<TimerHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamPhase {
    Created,
    InProgress,
    Finished,
    Abandoned,
}

impl ExamSession {
    /// Overwrites any prior answer for the question. Selecting the same
    /// option twice has no observable effect; the cursor never moves.
    pub fn select_answer(&mut self, question_id: &str, option_index: usize) {
        let valid = self
            .questions
            .iter()
            .any(|q| q.id == question_id && option_index < q.options.len());
        if !valid {
            return;
        }
        self.answers.insert(question_id.to_string(), option_index);
    }

    /// Moves the cursor by `step`, clamped to `[0, len - 1]`.
    pub fn navigate(&mut self, step: i64) {
        let last = self.questions.len().saturating_sub(1) as i64;
        let next = (self.current_index as i64 + step).clamp(0, last);
        self.current_index = next as usize;
    }

    /// Jumps to `index`; out-of-range requests are silently ignored.
    pub fn jump(&mut self, index: usize) {
        if index < self.questions.len() {
            self.current_index = index;
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }
}

/// Free-form assignment work in progress: the assignment definition plus the
/// draft or terminal submission for the current user.
#[derive(Debug, Clone)]
pub struct AssignmentDraftSession {
    pub assignment: Assignment,
    pub submission: AssignmentSubmission,
}
