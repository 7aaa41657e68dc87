mod common;

use chrono::Utc;
use examdeck_engine::engine::EngineEvent;
use examdeck_engine::gateway::{Collection, RemoteStoreGateway};
use examdeck_engine::models::HistoryRecord;
use examdeck_engine::services::{SnapshotEvent, SubscriptionScope};
use examdeck_engine::store::ViewName;
use examdeck_engine::{Command, Engine, EngineError};

async fn login(engine: &mut Engine, name: &str) {
    engine
        .dispatch(Command::Login { name: name.into() })
        .await
        .expect("login");
}

#[tokio::test]
async fn login_loads_history_sorted_with_averages() {
    let gateway = common::seeded_gateway();
    gateway.seed(
        Collection::ExamHistory,
        "h-old",
        common::history_doc("u-alice", "Mathematics", 50, 5),
    );
    gateway.seed(
        Collection::ExamHistory,
        "h-new",
        common::history_doc("u-alice", "Mathematics", 90, 1),
    );
    gateway.seed(
        Collection::ExamHistory,
        "h-bob",
        common::history_doc("u-bob", "Physics", 100, 2),
    );

    let mut engine = Engine::new(Default::default(), gateway.clone());
    engine.bootstrap().await.unwrap();
    login(&mut engine, "Alice").await;

    // only Alice's records, newest first
    let history = &engine.state().exam_history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, "h-new");
    assert_eq!(history[1].id, "h-old");

    let averages = &engine.state().subject_averages;
    assert_eq!(averages.len(), 1);
    assert_eq!(averages[0].subject, "Mathematics");
    assert_eq!(averages[0].average_score, 70.0);
    assert_eq!(averages[0].attempts, 2);

    // the denormalized copy on the user tracks the snapshot
    let user = engine.state().current_user.as_ref().unwrap();
    assert_eq!(user.exam_history.len(), 2);
}

#[tokio::test]
async fn login_with_unknown_name_fails() {
    let (mut engine, _gateway) = common::engine_with_fixtures().await;
    let err = engine
        .dispatch(Command::Login {
            name: "Nobody".into(),
        })
        .await
        .expect_err("unknown user");
    assert!(matches!(err, EngineError::NotFound { .. }));
    assert_eq!(engine.state().current_view, ViewName::Login);
}

#[tokio::test]
async fn switching_students_replaces_the_subscription() {
    let gateway = common::seeded_gateway();
    gateway.seed(
        Collection::ExamHistory,
        "h-alice",
        common::history_doc("u-alice", "Mathematics", 80, 1),
    );
    gateway.seed(
        Collection::ExamHistory,
        "h-bob",
        common::history_doc("u-bob", "Physics", 60, 1),
    );

    let mut engine = Engine::new(Default::default(), gateway.clone());
    engine.bootstrap().await.unwrap();
    login(&mut engine, "Admin").await;
    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 1);

    engine
        .dispatch(Command::ViewStudentAnalytics {
            student_id: "u-alice".into(),
        })
        .await
        .unwrap();
    assert_eq!(engine.state().current_view, ViewName::AdminAnalytics);
    assert_eq!(engine.state().viewed_student_id.as_deref(), Some("u-alice"));
    assert_eq!(engine.state().viewed_student_history.len(), 1);
    assert_eq!(engine.state().viewed_student_history[0].id, "h-alice");
    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 2);

    engine
        .dispatch(Command::ViewStudentAnalytics {
            student_id: "u-bob".into(),
        })
        .await
        .unwrap();
    // replace, not stack: still self + one viewed-student listener
    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 2);
    assert_eq!(engine.state().viewed_student_history.len(), 1);
    assert_eq!(engine.state().viewed_student_history[0].id, "h-bob");

    // a new record for the first student no longer reaches the view
    gateway
        .create(
            Collection::ExamHistory,
            common::history_doc("u-alice", "Mathematics", 95, 0),
        )
        .await
        .unwrap();
    engine.drain_events().await;
    assert_eq!(engine.state().viewed_student_history.len(), 1);
    assert_eq!(engine.state().viewed_student_history[0].id, "h-bob");
}

#[tokio::test]
async fn leaving_the_analytics_view_cancels_and_clears() {
    let gateway = common::seeded_gateway();
    gateway.seed(
        Collection::ExamHistory,
        "h-alice",
        common::history_doc("u-alice", "Mathematics", 80, 1),
    );

    let mut engine = Engine::new(Default::default(), gateway.clone());
    engine.bootstrap().await.unwrap();
    login(&mut engine, "Admin").await;
    engine
        .dispatch(Command::ViewStudentAnalytics {
            student_id: "u-alice".into(),
        })
        .await
        .unwrap();
    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 2);

    engine
        .dispatch(Command::ShowView(ViewName::AdminDashboard))
        .await
        .unwrap();

    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 1);
    assert!(engine.state().viewed_student_id.is_none());
    assert!(engine.state().viewed_student_history.is_empty());
    assert!(engine.state().viewed_subject_averages.is_empty());

    // mutations after the cancel do not resurrect the view
    gateway
        .create(
            Collection::ExamHistory,
            common::history_doc("u-alice", "Mathematics", 99, 0),
        )
        .await
        .unwrap();
    engine.drain_events().await;
    assert!(engine.state().viewed_student_history.is_empty());
}

#[tokio::test]
async fn analytics_require_the_admin_role() {
    let (mut engine, _gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;

    let err = engine
        .dispatch(Command::ViewStudentAnalytics {
            student_id: "u-bob".into(),
        })
        .await
        .expect_err("students cannot view analytics");
    assert!(matches!(err, EngineError::ValidationFailed(_)));
    assert_eq!(engine.state().current_view, ViewName::Home);
}

#[tokio::test]
async fn stale_generation_snapshots_are_discarded() {
    let (mut engine, _gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;
    assert!(engine.state().exam_history.is_empty());

    let forged = HistoryRecord {
        id: "forged".into(),
        user_id: "u-alice".into(),
        subject: "Mathematics".into(),
        category: "Basics".into(),
        score: 100,
        correct_count: 3,
        total_questions: 3,
        answers: Default::default(),
        question_ids: Vec::new(),
        taken_at: Utc::now(),
    };
    // generation 0 predates the live subscription (generations start at 1)
    engine
        .handle_event(EngineEvent::Snapshot(SnapshotEvent {
            scope: SubscriptionScope::SelfHistory,
            generation: 0,
            outcome: Ok(vec![forged]),
        }))
        .await;

    assert!(engine.state().exam_history.is_empty());
}

#[tokio::test]
async fn a_snapshot_error_is_terminal_for_the_scope() {
    let (mut engine, gateway) = common::engine_with_fixtures().await;
    login(&mut engine, "Alice").await;
    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 1);

    // the first subscription of the run carries generation 1
    engine
        .handle_event(EngineEvent::Snapshot(SnapshotEvent {
            scope: SubscriptionScope::SelfHistory,
            generation: 1,
            outcome: Err("stream closed".into()),
        }))
        .await;

    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 0);
    let notice = engine.state().notice.as_deref().expect("notice");
    assert!(notice.contains("self-history"));
    assert!(notice.contains("stream closed"));
}

#[tokio::test]
async fn subscribing_against_an_unavailable_store_fails_the_login() {
    let gateway = common::seeded_gateway();
    gateway.set_failing(Collection::ExamHistory, true);

    let mut engine = Engine::new(Default::default(), gateway.clone());
    engine.bootstrap().await.unwrap();
    let err = engine
        .dispatch(Command::Login {
            name: "Alice".into(),
        })
        .await
        .expect_err("subscribe fails");
    assert!(matches!(err, EngineError::RemoteUnavailable { .. }));
}

#[tokio::test]
async fn logout_cancels_everything_and_resets_the_state() {
    let gateway = common::seeded_gateway();
    gateway.seed(
        Collection::ExamHistory,
        "h-alice",
        common::history_doc("u-alice", "Mathematics", 80, 1),
    );

    let mut engine = Engine::new(Default::default(), gateway.clone());
    engine.bootstrap().await.unwrap();
    login(&mut engine, "Admin").await;
    engine
        .dispatch(Command::ViewStudentAnalytics {
            student_id: "u-alice".into(),
        })
        .await
        .unwrap();

    engine.dispatch(Command::Logout).await.unwrap();

    assert_eq!(engine.state().current_view, ViewName::Login);
    assert!(engine.state().current_user.is_none());
    assert!(engine.state().exam_history.is_empty());
    assert!(engine.state().viewed_student_history.is_empty());
    assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 0);
}
