#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use examdeck_engine::gateway::{Collection, InMemoryGateway};
use examdeck_engine::{Engine, EngineConfig};

/// Shared fixture data: one subject with a three-question category, three
/// users (two students, one admin), and one two-part assignment.
pub fn seeded_gateway() -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new());

    gateway.seed(Collection::Subjects, "math", json!({ "name": "Mathematics" }));
    gateway.seed(
        Collection::Subjects,
        "physics",
        json!({ "name": "Physics" }),
    );
    gateway.seed(
        Collection::Categories,
        "basics",
        json!({ "subject_id": "math", "name": "Basics", "time_limit_minutes": 10 }),
    );
    gateway.seed(
        Collection::Categories,
        "empty",
        json!({ "subject_id": "math", "name": "Empty", "time_limit_minutes": 10 }),
    );

    gateway.seed(
        Collection::Questions,
        "q1",
        json!({
            "subject_id": "math",
            "category_id": "basics",
            "text": "2 + 2 = ?",
            "options": ["4", "5", "22"],
            "answer": "4",
            "explanation": "Basic addition."
        }),
    );
    gateway.seed(
        Collection::Questions,
        "q2",
        json!({
            "subject_id": "math",
            "category_id": "basics",
            "text": "3 * 3 = ?",
            "options": ["6", "9", "33"],
            "answer": "9",
            "explanation": null
        }),
    );
    gateway.seed(
        Collection::Questions,
        "q3",
        json!({
            "subject_id": "math",
            "category_id": "basics",
            "text": "10 / 2 = ?",
            "options": ["5", "2", "20"],
            "answer": "5",
            "explanation": null
        }),
    );

    gateway.seed(
        Collection::Users,
        "u-alice",
        json!({ "name": "Alice", "role": "student" }),
    );
    gateway.seed(
        Collection::Users,
        "u-bob",
        json!({ "name": "Bob", "role": "student" }),
    );
    gateway.seed(
        Collection::Users,
        "u-admin",
        json!({ "name": "Admin", "role": "admin" }),
    );

    gateway.seed(
        Collection::Assignments,
        "a1",
        json!({
            "title": "Essay on limits",
            "description": "Two short essays.",
            "questions": [
                { "id": "aq1", "prompt": "Define a limit." },
                { "id": "aq2", "prompt": "Give an example." }
            ],
            "max_score": 100
        }),
    );

    gateway
}

/// Default config with the real countdown slowed to a crawl, so tests that
/// need ticks drive them synthetically instead of racing the wall clock.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        tick_interval_ms: 3_600_000,
        ..EngineConfig::default()
    }
}

pub async fn engine_with_fixtures() -> (Engine, Arc<InMemoryGateway>) {
    let gateway = seeded_gateway();
    let mut engine = Engine::new(test_config(), gateway.clone());
    engine.bootstrap().await.expect("bootstrap");
    (engine, gateway)
}

/// A minimal persisted history record for a user, dated by `days_ago`.
pub fn history_doc(user_id: &str, subject: &str, score: u8, days_ago: i64) -> serde_json::Value {
    let taken_at = chrono::Utc::now() - chrono::Duration::days(days_ago);
    json!({
        "user_id": user_id,
        "subject": subject,
        "category": "Basics",
        "score": score,
        "correct_count": u32::from(score) / 34,
        "total_questions": 3,
        "answers": {},
        "question_ids": [],
        "taken_at": taken_at,
    })
}
