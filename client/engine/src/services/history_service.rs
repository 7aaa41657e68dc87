use std::sync::Arc;

use serde_json::json;

use crate::error::{EngineError, EngineResult};
use crate::gateway::{Collection, RemoteStoreGateway};
use crate::models::{BookmarkedQuestion, Question};
use crate::services::subscription_service::compute_subject_averages;
use crate::store::{StateDelta, StateStore, ViewName};

/// Synchronous yes/no gate for destructive actions. The UI shell installs a
/// real prompt; the core only proceeds on an affirmative answer.
pub trait ConfirmGate: Send + Sync {
    fn confirm(&self, action: &str) -> bool;
}

/// Gate that approves everything (demo binary and tests).
pub struct AutoConfirm;

impl ConfirmGate for AutoConfirm {
    fn confirm(&self, _action: &str) -> bool {
        true
    }
}

pub struct HistoryService {
    gateway: Arc<dyn RemoteStoreGateway>,
    gate: Arc<dyn ConfirmGate>,
    optimistic_deletes: bool,
}

impl HistoryService {
    pub fn new(
        gateway: Arc<dyn RemoteStoreGateway>,
        gate: Arc<dyn ConfirmGate>,
        optimistic_deletes: bool,
    ) -> Self {
        Self {
            gateway,
            gate,
            optimistic_deletes,
        }
    }

    /// Deletes a history record after the confirmation gate. The local
    /// removal is applied optimistically while the remote delete is in
    /// flight; the next authoritative snapshot reconciles either way.
    /// Returns `false` when the gate declined.
    pub async fn delete_record(&self, store: &mut StateStore, record_id: &str) -> EngineResult<bool> {
        if !self.gate.confirm("delete this exam history record") {
            return Ok(false);
        }

        if self.optimistic_deletes {
            self.remove_record_locally(store, record_id);
        }

        match self
            .gateway
            .delete(Collection::ExamHistory, record_id)
            .await
        {
            Ok(()) => {
                if !self.optimistic_deletes {
                    self.remove_record_locally(store, record_id);
                }
                tracing::info!(record = record_id, "history record deleted");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(record = record_id, error = %err, "history delete failed");
                store.update(StateDelta::new().notice(Some(
                    "The record could not be deleted on the server.".to_string(),
                )));
                Err(EngineError::remote(err))
            }
        }
    }

    fn remove_record_locally(&self, store: &mut StateStore, record_id: &str) {
        let mut history = store.state().exam_history.clone();
        history.retain(|record| record.id != record_id);
        let averages = compute_subject_averages(&history);
        store.update(
            StateDelta::new()
                .exam_history(history)
                .subject_averages(averages),
        );
    }

    /// Saves a snapshot of the question under a store-assigned bookmark id.
    /// Bookmarking an already-bookmarked question is a no-op.
    pub async fn add_bookmark(&self, store: &mut StateStore, question: &Question) -> EngineResult<()> {
        let user = store
            .state()
            .current_user
            .clone()
            .ok_or_else(|| EngineError::ValidationFailed("a user must be logged in".into()))?;

        if store
            .state()
            .bookmarks
            .iter()
            .any(|b| b.question.id == question.id)
        {
            return Ok(());
        }

        let bookmark_id = self
            .gateway
            .create(
                Collection::BookmarkedQuestions,
                json!({ "user_id": user.id, "question": question }),
            )
            .await
            .map_err(EngineError::remote)?;

        let bookmark = BookmarkedQuestion {
            bookmark_id: bookmark_id.clone(),
            user_id: user.id.clone(),
            question: question.clone(),
        };
        let mut bookmarks = store.state().bookmarks.clone();
        bookmarks.push(bookmark);

        let mut user = user;
        user.bookmarked_questions = bookmarks.clone();

        tracing::info!(bookmark = %bookmark_id, question = %question.id, "question bookmarked");
        store.update(StateDelta::new().bookmarks(bookmarks).user(Some(user)));
        Ok(())
    }

    /// Removes a bookmark after the confirmation gate, optimistically.
    pub async fn remove_bookmark(
        &self,
        store: &mut StateStore,
        bookmark_id: &str,
    ) -> EngineResult<bool> {
        if !self.gate.confirm("remove this bookmark") {
            return Ok(false);
        }

        let apply_locally = |store: &mut StateStore| {
            let mut bookmarks = store.state().bookmarks.clone();
            bookmarks.retain(|b| b.bookmark_id != bookmark_id);
            let user = store.state().current_user.clone().map(|mut user| {
                user.bookmarked_questions = bookmarks.clone();
                user
            });
            let delta = StateDelta::new().bookmarks(bookmarks);
            store.update(match user {
                Some(user) => delta.user(Some(user)),
                None => delta,
            });
        };

        if self.optimistic_deletes {
            apply_locally(store);
        }

        match self
            .gateway
            .delete(Collection::BookmarkedQuestions, bookmark_id)
            .await
        {
            Ok(()) => {
                if !self.optimistic_deletes {
                    apply_locally(store);
                }
                tracing::info!(bookmark = bookmark_id, "bookmark removed");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(bookmark = bookmark_id, error = %err, "bookmark delete failed");
                store.update(StateDelta::new().notice(Some(
                    "The bookmark could not be removed on the server.".to_string(),
                )));
                Err(EngineError::remote(err))
            }
        }
    }

    /// Loads the user's bookmarks and shows the bookmarks view.
    pub async fn show_bookmarks(&self, store: &mut StateStore) -> EngineResult<()> {
        let user = store
            .state()
            .current_user
            .clone()
            .ok_or_else(|| EngineError::ValidationFailed("a user must be logged in".into()))?;

        let bookmarks = self
            .gateway
            .query_where(Collection::BookmarkedQuestions, "user_id", json!(user.id))
            .await
            .map_err(EngineError::remote)?
            .into_iter()
            .map(|record| {
                // the document id doubles as the bookmark id
                let question: Question = record
                    .data
                    .get("question")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| EngineError::remote(e.into()))?
                    .ok_or_else(|| EngineError::not_found("bookmark question", &record.id))?;
                Ok(BookmarkedQuestion {
                    bookmark_id: record.id.clone(),
                    user_id: user.id.clone(),
                    question,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let mut user = user;
        user.bookmarked_questions = bookmarks.clone();
        store.update(
            StateDelta::new()
                .view(ViewName::Bookmarks)
                .bookmarks(bookmarks)
                .user(Some(user)),
        );
        Ok(())
    }
}
