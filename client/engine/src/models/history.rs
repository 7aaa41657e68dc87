use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a finished exam. Immutable once created: produced only by the
/// scoring pass, deleted only by explicit user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub category: String,
    /// 0-100, rounded.
    pub score: u8,
    pub correct_count: u32,
    pub total_questions: u32,
    /// question id -> selected option index.
    pub answers: HashMap<String, usize>,
    /// Question ids in the order they were presented, kept so a review can be
    /// reconstructed.
    pub question_ids: Vec<String>,
    pub taken_at: DateTime<Utc>,
}

/// Per-subject average score, derived from history records for the
/// radar-style summary. Never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub average_score: f64,
    pub attempts: u32,
}
