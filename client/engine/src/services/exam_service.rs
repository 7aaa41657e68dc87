use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::engine::EngineEvent;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{Collection, RemoteStoreGateway};
use crate::models::{
    Category, ExamPhase, ExamSession, HistoryRecord, Question, Subject, SubjectAverage,
};
use crate::services::subscription_service::compute_subject_averages;
use crate::store::{AppMode, StateDelta, StateStore, ViewName};
use crate::timer;

/// One line of a reconstructed exam review. A vanished question shows a
/// placeholder instead of failing the view.
#[derive(Debug, Clone)]
pub struct ReviewEntry {
    pub question: Question,
    pub selected_option: Option<usize>,
    pub correct: bool,
    pub missing: bool,
}

pub struct ExamService {
    gateway: Arc<dyn RemoteStoreGateway>,
    default_time_limit_minutes: u32,
}

impl ExamService {
    pub fn new(gateway: Arc<dyn RemoteStoreGateway>, default_time_limit_minutes: u32) -> Self {
        Self {
            gateway,
            default_time_limit_minutes,
        }
    }

    /// Starts a timed exam for the (subject, category) pair: loads and
    /// shuffles the question set, arms the countdown, and moves the view to
    /// exam-taking.
    pub async fn start(
        &self,
        store: &mut StateStore,
        events: &UnboundedSender<EngineEvent>,
        tick_interval: Duration,
        subject_id: &str,
        category_id: &str,
    ) -> EngineResult<()> {
        let user_id = store
            .state()
            .current_user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or_else(|| {
                EngineError::ValidationFailed("a user must be logged in to start an exam".into())
            })?;

        let subject: Subject = self.fetch(Collection::Subjects, "subject", subject_id).await?;
        let category: Category = self
            .fetch(Collection::Categories, "category", category_id)
            .await?;

        let records = self
            .gateway
            .query_where(Collection::Questions, "category_id", json!(category_id))
            .await
            .map_err(EngineError::remote)?;
        let questions = records
            .iter()
            .map(|r| r.decode::<Question>())
            .collect::<Result<Vec<Question>, _>>()
            .map_err(EngineError::remote)?;
        if questions.is_empty() {
            return Err(EngineError::EmptyCategory {
                category: category.name,
            });
        }
        let questions = shuffle_questions(questions);

        let minutes = if category.time_limit_minutes > 0 {
            category.time_limit_minutes
        } else {
            self.default_time_limit_minutes
        };
        let total_seconds = minutes * 60;

        // restart: any previous exam resources go first
        store.dispose_mode(AppMode::ExamTaking);

        let session_id = Uuid::new_v4();
        let handle = timer::spawn_countdown(session_id, total_seconds, tick_interval, events.clone());
        let session = ExamSession {
            id: session_id,
            subject,
            category,
            questions,
            answers: HashMap::new(),
            current_index: 0,
            time_left_seconds: total_seconds,
            phase: ExamPhase::InProgress,
            timer: Some(handle.clone()),
        };

        tracing::info!(
            session = %session_id,
            user = %user_id,
            questions = session.questions.len(),
            seconds = total_seconds,
            "exam started"
        );

        store.update(
            StateDelta::new()
                .view(ViewName::ExamTaking)
                .exam_session(Some(session)),
        );
        store.acquire(AppMode::ExamTaking, Box::new(handle));
        Ok(())
    }

    /// Records an answer for the running session. Re-selecting the same
    /// option is a no-op; out-of-session calls are ignored.
    pub fn select_answer(&self, store: &mut StateStore, question_id: &str, option_index: usize) {
        let Some(session) = store.state().exam_session.as_ref() else {
            return;
        };
        if session.phase != ExamPhase::InProgress {
            return;
        }
        if session.answers.get(question_id) == Some(&option_index) {
            return;
        }
        let mut session = session.clone();
        session.select_answer(question_id, option_index);
        store.update(StateDelta::new().exam_session(Some(session)));
    }

    pub fn navigate(&self, store: &mut StateStore, step: i64) {
        let Some(session) = store.state().exam_session.as_ref() else {
            return;
        };
        if session.phase != ExamPhase::InProgress {
            return;
        }
        let mut session = session.clone();
        session.navigate(step);
        store.update(StateDelta::new().exam_session(Some(session)));
    }

    pub fn jump(&self, store: &mut StateStore, index: usize) {
        let Some(session) = store.state().exam_session.as_ref() else {
            return;
        };
        if session.phase != ExamPhase::InProgress {
            return;
        }
        let mut session = session.clone();
        session.jump(index);
        store.update(StateDelta::new().exam_session(Some(session)));
    }

    /// Terminates the running session locally: cancels the timer, scores the
    /// answer map, applies the record optimistically, and moves to the
    /// result view. Returns `None` when no session is in progress, which
    /// also makes a second finish a no-op. Durable persistence is the
    /// caller's next step (`persist_history`).
    pub fn finish(&self, store: &mut StateStore) -> Option<HistoryRecord> {
        let session = store.state().exam_session.as_ref()?;
        if session.phase != ExamPhase::InProgress {
            return None;
        }
        let mut session = session.clone();

        if let Some(handle) = session.timer.take() {
            if handle.cancel() {
                tracing::debug!(session = %session.id, "exam timer cancelled on finish");
            }
        }
        session.phase = ExamPhase::Finished;

        let (correct_count, score) = score_session(&session);
        let user_id = store
            .state()
            .current_user
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_default();
        let record = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            user_id,
            subject: session.subject.name.clone(),
            category: session.category.name.clone(),
            score,
            correct_count,
            total_questions: session.questions.len() as u32,
            answers: session.answers.clone(),
            question_ids: session.questions.iter().map(|q| q.id.clone()).collect(),
            taken_at: Utc::now(),
        };

        tracing::info!(
            session = %session.id,
            score,
            correct = correct_count,
            total = record.total_questions,
            "exam finished"
        );

        // provisional until the next authoritative history snapshot
        let mut history = store.state().exam_history.clone();
        history.insert(0, record.clone());
        let averages: Vec<SubjectAverage> = compute_subject_averages(&history);

        store.update(
            StateDelta::new()
                .view(ViewName::ExamResult)
                .exam_session(Some(session))
                .last_result(Some(record.clone()))
                .exam_history(history)
                .subject_averages(averages),
        );

        Some(record)
    }

    /// Persists a scored record. On failure the session stays terminated
    /// locally; the miss is reported as a notice and returned to the caller.
    pub async fn persist_history(
        &self,
        store: &mut StateStore,
        record: &HistoryRecord,
    ) -> EngineResult<()> {
        let payload = serde_json::to_value(record).map_err(|e| EngineError::remote(e.into()))?;
        match self.gateway.create(Collection::ExamHistory, payload).await {
            Ok(id) => {
                tracing::info!(record = %id, "history record persisted");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist history record");
                store.update(StateDelta::new().notice(Some(
                    "Your result could not be saved to the server.".to_string(),
                )));
                Err(EngineError::remote(err))
            }
        }
    }

    /// Discards the running session without scoring.
    pub fn abandon(&self, store: &mut StateStore) {
        let Some(session) = store.state().exam_session.as_ref() else {
            return;
        };
        if session.phase != ExamPhase::InProgress {
            return;
        }
        if let Some(handle) = session.timer.as_ref() {
            handle.cancel();
        }
        tracing::info!(session = %session.id, "exam abandoned");
        store.dispose_mode(AppMode::ExamTaking);
        store.update(StateDelta::new().view(ViewName::Home).exam_session(None));
    }

    /// Rebuilds the per-question review for a history record. Questions
    /// deleted since the exam render as placeholders.
    pub async fn load_review(&self, record: &HistoryRecord) -> EngineResult<Vec<ReviewEntry>> {
        let mut entries = Vec::with_capacity(record.question_ids.len());
        for question_id in &record.question_ids {
            let found = self
                .gateway
                .read_one(Collection::Questions, question_id)
                .await
                .map_err(EngineError::remote)?;
            let (question, missing) = match found {
                Some(record) => (record.decode::<Question>().map_err(EngineError::remote)?, false),
                None => (Question::placeholder(question_id), true),
            };
            let selected_option = record.answers.get(question_id).copied();
            let correct = !missing
                && selected_option
                    .and_then(|idx| question.options.get(idx))
                    .map(|text| text.trim() == question.answer.trim())
                    .unwrap_or(false);
            entries.push(ReviewEntry {
                question,
                selected_option,
                correct,
                missing,
            });
        }
        Ok(entries)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        collection: Collection,
        entity: &'static str,
        id: &str,
    ) -> EngineResult<T> {
        let record = self
            .gateway
            .read_one(collection, id)
            .await
            .map_err(EngineError::remote)?
            .ok_or_else(|| EngineError::not_found(entity, id))?;
        record.decode().map_err(EngineError::remote)
    }
}

/// Uniform permutation of the question set (Fisher-Yates via `rand`).
fn shuffle_questions(mut questions: Vec<Question>) -> Vec<Question> {
    questions.shuffle(&mut rand::rng());
    questions
}

/// Counts questions whose selected option TEXT equals the canonical answer
/// text (the canonical answer is stored as text, not an index), then rounds
/// the percentage.
fn score_session(session: &ExamSession) -> (u32, u8) {
    let total = session.questions.len();
    let correct = session
        .questions
        .iter()
        .filter(|question| {
            session
                .answers
                .get(&question.id)
                .and_then(|idx| question.options.get(*idx))
                .map(|text| text.trim() == question.answer.trim())
                .unwrap_or(false)
        })
        .count();
    let score = if total == 0 {
        0
    } else {
        ((correct as f64 / total as f64) * 100.0).round() as u8
    };
    (correct as u32, score)
}
