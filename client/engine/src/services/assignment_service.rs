use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::{Validate, ValidationError};

use crate::error::{EngineError, EngineResult};
use crate::gateway::{Collection, RemoteStoreGateway};
use crate::models::{
    Assignment, AssignmentAnswer, AssignmentDraftSession, AssignmentSubmission, SubmissionStatus,
};
use crate::store::{StateDelta, StateStore, ViewName};

/// Validated shape of a submit request: one non-empty answer per
/// sub-question. Checked before any remote call.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitAssignmentPayload {
    #[validate(length(min = 1), custom(function = all_answers_present))]
    pub answers: Vec<String>,
}

fn all_answers_present(answers: &[String]) -> Result<(), ValidationError> {
    if answers.iter().any(|answer| answer.trim().is_empty()) {
        let mut error = ValidationError::new("answer_missing");
        error.message = Some("every sub-question needs an answer".into());
        return Err(error);
    }
    Ok(())
}

pub struct AssignmentService {
    gateway: Arc<dyn RemoteStoreGateway>,
}

impl AssignmentService {
    pub fn new(gateway: Arc<dyn RemoteStoreGateway>) -> Self {
        Self { gateway }
    }

    /// Loads the assignment and the current user's existing submission (at
    /// most one per (assignment, user)), or seeds an empty draft.
    pub async fn open(&self, store: &mut StateStore, assignment_id: &str) -> EngineResult<()> {
        let user_id = self.require_user(store)?;

        let record = self
            .gateway
            .read_one(Collection::Assignments, assignment_id)
            .await
            .map_err(EngineError::remote)?
            .ok_or_else(|| EngineError::not_found("assignment", assignment_id))?;
        let assignment: Assignment = record.decode().map_err(EngineError::remote)?;

        let existing = self
            .gateway
            .query_where(
                Collection::AssignmentSubmissions,
                "assignment_id",
                json!(assignment_id),
            )
            .await
            .map_err(EngineError::remote)?
            .into_iter()
            .map(|r| r.decode::<AssignmentSubmission>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(EngineError::remote)?
            .into_iter()
            .find(|submission| submission.user_id == user_id);

        let submission = existing.unwrap_or_else(|| AssignmentSubmission {
            id: String::new(), // assigned by the store on first save
            assignment_id: assignment.id.clone(),
            user_id: user_id.clone(),
            answers: assignment
                .questions
                .iter()
                .map(|q| AssignmentAnswer {
                    question_id: q.id.clone(),
                    content: String::new(),
                })
                .collect(),
            status: SubmissionStatus::Draft,
            score: None,
            feedback: None,
            updated_at: Utc::now(),
            submitted_at: None,
            graded_at: None,
        });

        tracing::info!(
            assignment = assignment_id,
            user = %user_id,
            status = submission.status.as_str(),
            "assignment opened"
        );

        store.update(
            StateDelta::new()
                .view(ViewName::AssignmentWork)
                .assignment_session(Some(AssignmentDraftSession {
                    assignment,
                    submission,
                })),
        );
        Ok(())
    }

    /// Replaces the answer blob at `index`. Rejected once the submission
    /// left the draft state.
    pub fn set_answer(
        &self,
        store: &mut StateStore,
        index: usize,
        content: String,
    ) -> EngineResult<()> {
        let session = self.require_session(store)?;
        self.require_editable(&session)?;

        let mut session = session;
        let Some(answer) = session.submission.answers.get_mut(index) else {
            return Ok(()); // out-of-range edits are ignored, like navigation
        };
        answer.content = content;
        store.update(StateDelta::new().assignment_session(Some(session)));
        Ok(())
    }

    /// Persists the draft. Idempotent and repeatable: the first save creates
    /// the submission document, later saves patch it in place.
    pub async fn save_draft(&self, store: &mut StateStore) -> EngineResult<()> {
        let session = self.require_session(store)?;
        self.require_editable(&session)?;

        let mut session = session;
        session.submission.updated_at = Utc::now();
        self.persist(&mut session.submission).await?;

        tracing::info!(
            submission = %session.submission.id,
            assignment = %session.submission.assignment_id,
            "draft saved"
        );
        store.update(StateDelta::new().assignment_session(Some(session)));
        Ok(())
    }

    /// One-way transition to `submitted`. Validation runs before any remote
    /// call; submitted and graded submissions reject further edits.
    pub async fn submit(&self, store: &mut StateStore) -> EngineResult<()> {
        let session = self.require_session(store)?;
        self.require_editable(&session)?;

        let payload = SubmitAssignmentPayload {
            answers: session
                .submission
                .answers
                .iter()
                .map(|a| a.content.clone())
                .collect(),
        };
        payload
            .validate()
            .map_err(|errors| EngineError::ValidationFailed(errors.to_string()))?;

        let mut session = session;
        let now = Utc::now();
        session.submission.status = SubmissionStatus::Submitted;
        session.submission.submitted_at = Some(now);
        session.submission.updated_at = now;
        self.persist(&mut session.submission).await?;

        tracing::info!(
            submission = %session.submission.id,
            assignment = %session.submission.assignment_id,
            "assignment submitted"
        );
        store.update(StateDelta::new().assignment_session(Some(session)));
        Ok(())
    }

    /// Admin-only `submitted -> graded` transition. The score is clamped to
    /// `[0, max_score]`.
    pub async fn grade(
        &self,
        store: &mut StateStore,
        submission_id: &str,
        score: u32,
        feedback: String,
    ) -> EngineResult<()> {
        let is_admin = store
            .state()
            .current_user
            .as_ref()
            .map(|u| u.is_admin())
            .unwrap_or(false);
        if !is_admin {
            return Err(EngineError::ValidationFailed(
                "grading requires the admin role".into(),
            ));
        }

        let record = self
            .gateway
            .read_one(Collection::AssignmentSubmissions, submission_id)
            .await
            .map_err(EngineError::remote)?
            .ok_or_else(|| EngineError::not_found("submission", submission_id))?;
        let submission: AssignmentSubmission = record.decode().map_err(EngineError::remote)?;

        match submission.status {
            SubmissionStatus::Submitted => {}
            SubmissionStatus::Draft => {
                return Err(EngineError::ValidationFailed(
                    "submission has not been submitted yet".into(),
                ));
            }
            SubmissionStatus::Graded => {
                return Err(EngineError::SubmissionLocked { status: "graded" });
            }
        }

        let assignment = self
            .gateway
            .read_one(Collection::Assignments, &submission.assignment_id)
            .await
            .map_err(EngineError::remote)?
            .ok_or_else(|| EngineError::not_found("assignment", &submission.assignment_id))?
            .decode::<Assignment>()
            .map_err(EngineError::remote)?;
        let clamped = score.min(assignment.max_score);
        if clamped != score {
            tracing::warn!(score, max = assignment.max_score, "grade clamped to max score");
        }

        let now = Utc::now();
        self.gateway
            .update(
                Collection::AssignmentSubmissions,
                submission_id,
                json!({
                    "status": SubmissionStatus::Graded,
                    "score": clamped,
                    "feedback": feedback,
                    "graded_at": now,
                    "updated_at": now,
                }),
            )
            .await
            .map_err(EngineError::remote)?;

        tracing::info!(submission = submission_id, score = clamped, "submission graded");
        Ok(())
    }

    async fn persist(&self, submission: &mut AssignmentSubmission) -> EngineResult<()> {
        if submission.id.is_empty() {
            let mut payload =
                serde_json::to_value(&*submission).map_err(|e| EngineError::remote(e.into()))?;
            if let Some(object) = payload.as_object_mut() {
                object.remove("id"); // let the store assign one
            }
            let id = self
                .gateway
                .create(Collection::AssignmentSubmissions, payload)
                .await
                .map_err(EngineError::remote)?;
            submission.id = id;
        } else {
            let payload =
                serde_json::to_value(&*submission).map_err(|e| EngineError::remote(e.into()))?;
            self.gateway
                .update(Collection::AssignmentSubmissions, &submission.id, payload)
                .await
                .map_err(EngineError::remote)?;
        }
        Ok(())
    }

    fn require_user(&self, store: &StateStore) -> EngineResult<String> {
        store
            .state()
            .current_user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or_else(|| EngineError::ValidationFailed("a user must be logged in".into()))
    }

    fn require_session(&self, store: &StateStore) -> EngineResult<AssignmentDraftSession> {
        store
            .state()
            .assignment_session
            .clone()
            .ok_or_else(|| EngineError::ValidationFailed("no assignment is open".into()))
    }

    fn require_editable(&self, session: &AssignmentDraftSession) -> EngineResult<()> {
        if session.submission.status.is_locked() {
            return Err(EngineError::SubmissionLocked {
                status: session.submission.status.as_str(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_rejects_blank_answers() {
        let payload = SubmitAssignmentPayload {
            answers: vec!["done".into(), "   ".into()],
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn payload_rejects_empty_answer_list() {
        let payload = SubmitAssignmentPayload { answers: vec![] };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn payload_accepts_complete_answers() {
        let payload = SubmitAssignmentPayload {
            answers: vec!["first".into(), "second".into()],
        };
        assert!(payload.validate().is_ok());
    }
}
