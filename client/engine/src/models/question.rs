use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub subject_id: String,
    pub name: String,
    pub time_limit_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub subject_id: String,
    pub category_id: String,
    pub text: String,
    pub options: Vec<String>,
    /// Canonical answer stored as text, not as an option index.
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Stand-in for a question that was deleted after a history record
    /// referenced it. Review views render this instead of failing.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            subject_id: String::new(),
            category_id: String::new(),
            text: "This question is no longer available.".to_string(),
            options: Vec::new(),
            answer: String::new(),
            explanation: None,
        }
    }
}

/// A question snapshot saved by the user, keyed by the store-assigned
/// bookmark id used for later removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkedQuestion {
    pub bookmark_id: String,
    pub user_id: String,
    pub question: Question,
}
