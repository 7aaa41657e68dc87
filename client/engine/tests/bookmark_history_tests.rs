mod common;

use std::sync::Arc;

use examdeck_engine::gateway::Collection;
use examdeck_engine::services::history_service::ConfirmGate;
use examdeck_engine::store::ViewName;
use examdeck_engine::{Command, Engine};

struct DeclineAll;

impl ConfirmGate for DeclineAll {
    fn confirm(&self, _action: &str) -> bool {
        false
    }
}

async fn login(engine: &mut Engine, name: &str) {
    engine
        .dispatch(Command::Login { name: name.into() })
        .await
        .expect("login");
}

async fn finish_an_exam(engine: &mut Engine) {
    engine
        .dispatch(Command::StartExam {
            subject_id: "math".into(),
            category_id: "basics".into(),
        })
        .await
        .unwrap();
    engine.dispatch(Command::FinishExam).await.unwrap();
}

#[tokio::test]
async fn bookmarking_from_the_exam_is_idempotent() {
    let (mut engine, gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;
    engine
        .dispatch(Command::StartExam {
            subject_id: "math".into(),
            category_id: "basics".into(),
        })
        .await
        .unwrap();

    engine
        .dispatch(Command::BookmarkQuestion {
            question_id: "q1".into(),
        })
        .await
        .unwrap();
    engine
        .dispatch(Command::BookmarkQuestion {
            question_id: "q1".into(),
        })
        .await
        .unwrap();

    assert_eq!(engine.state().bookmarks.len(), 1);
    assert_eq!(gateway.document_count(Collection::BookmarkedQuestions), 1);
    assert_eq!(engine.state().bookmarks[0].question.id, "q1");
    assert_eq!(engine.state().bookmarks[0].user_id, "u-alice");
}

#[tokio::test]
async fn show_bookmarks_lists_only_the_current_user() {
    let (mut engine, gateway) = common::engine_with_fixtures().await;

    // another user's bookmark, pre-existing
    gateway.seed(
        Collection::BookmarkedQuestions,
        "b-bob",
        serde_json::json!({
            "user_id": "u-bob",
            "question": {
                "id": "q2",
                "subject_id": "math",
                "category_id": "basics",
                "text": "3 * 3 = ?",
                "options": ["6", "9", "33"],
                "answer": "9",
                "explanation": null
            }
        }),
    );

    login(&mut engine, "Alice").await;
    engine
        .dispatch(Command::StartExam {
            subject_id: "math".into(),
            category_id: "basics".into(),
        })
        .await
        .unwrap();
    engine
        .dispatch(Command::BookmarkQuestion {
            question_id: "q3".into(),
        })
        .await
        .unwrap();

    engine.dispatch(Command::ShowBookmarks).await.unwrap();

    assert_eq!(engine.state().current_view, ViewName::Bookmarks);
    assert_eq!(engine.state().bookmarks.len(), 1);
    assert_eq!(engine.state().bookmarks[0].question.id, "q3");
}

#[tokio::test]
async fn removing_a_bookmark_updates_local_state_and_store() {
    let (mut engine, gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;
    engine
        .dispatch(Command::StartExam {
            subject_id: "math".into(),
            category_id: "basics".into(),
        })
        .await
        .unwrap();
    engine
        .dispatch(Command::BookmarkQuestion {
            question_id: "q1".into(),
        })
        .await
        .unwrap();
    let bookmark_id = engine.state().bookmarks[0].bookmark_id.clone();

    engine
        .dispatch(Command::RemoveBookmark { bookmark_id })
        .await
        .unwrap();

    assert!(engine.state().bookmarks.is_empty());
    assert_eq!(gateway.document_count(Collection::BookmarkedQuestions), 0);
    let user = engine.state().current_user.as_ref().unwrap();
    assert!(user.bookmarked_questions.is_empty());
}

#[tokio::test]
async fn deleting_a_history_record_removes_it_everywhere() {
    let (mut engine, gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;
    finish_an_exam(&mut engine).await;
    assert_eq!(engine.state().exam_history.len(), 1);
    let record_id = engine.state().exam_history[0].id.clone();

    engine
        .dispatch(Command::DeleteHistoryRecord { record_id })
        .await
        .unwrap();

    assert_eq!(gateway.document_count(Collection::ExamHistory), 0);
    assert!(engine.state().exam_history.is_empty());
    assert!(engine.state().subject_averages.is_empty());
}

#[tokio::test]
async fn a_declined_confirmation_leaves_everything_untouched() {
    let gateway = common::seeded_gateway();
    let mut engine =
        Engine::with_confirm_gate(common::test_config(), gateway.clone(), Arc::new(DeclineAll));
    engine.bootstrap().await.unwrap();
    login(&mut engine, "Alice").await;
    finish_an_exam(&mut engine).await;
    let record_id = engine.state().exam_history[0].id.clone();

    engine
        .dispatch(Command::DeleteHistoryRecord { record_id })
        .await
        .unwrap();

    assert_eq!(gateway.document_count(Collection::ExamHistory), 1);
    assert_eq!(engine.state().exam_history.len(), 1);
}

#[tokio::test]
async fn failed_remote_delete_reports_a_notice() {
    let (mut engine, gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;
    finish_an_exam(&mut engine).await;
    let record_id = engine.state().exam_history[0].id.clone();

    gateway.set_failing(Collection::ExamHistory, true);
    let err = engine
        .dispatch(Command::DeleteHistoryRecord { record_id })
        .await
        .expect_err("remote delete fails");
    assert!(matches!(
        err,
        examdeck_engine::EngineError::RemoteUnavailable { .. }
    ));
    assert_eq!(
        engine.state().notice.as_deref(),
        Some("The record could not be deleted on the server.")
    );
    assert_eq!(gateway.document_count(Collection::ExamHistory), 1);
}
