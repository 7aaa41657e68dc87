use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error taxonomy. None of these are fatal: every failure path
/// returns control with the prior state intact.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No questions exist for the selected subject/category pair.
    /// User-correctable; blocks session start.
    #[error("no questions available for category '{category}'")]
    EmptyCategory { category: String },

    /// A remote read, write, or subscribe failed. Surfaced as a message and
    /// not retried automatically.
    #[error("remote store unavailable: {source}")]
    RemoteUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// A referenced document vanished between load and use.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Required fields are missing or malformed; blocks the operation before
    /// any remote call.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The submission already left the draft state and rejects further edits.
    #[error("submission is {status} and can no longer be edited")]
    SubmissionLocked { status: &'static str },
}

impl EngineError {
    pub fn remote(source: anyhow::Error) -> Self {
        Self::RemoteUnavailable { source }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
