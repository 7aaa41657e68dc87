use serde::{Deserialize, Serialize};

use super::history::HistoryRecord;
use super::question::BookmarkedQuestion;

/// User model mirrored from the "users" collection. Owned by the state
/// store, mutated only through store updates, destroyed on logout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    /// Denormalized exam history, ordered by date descending. Refreshed by
    /// the self-history subscription.
    #[serde(default)]
    pub exam_history: Vec<HistoryRecord>,
    #[serde(default)]
    pub bookmarked_questions: Vec<BookmarkedQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Admin,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
