use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use examdeck_engine::gateway::{Collection, InMemoryGateway};
use examdeck_engine::{Command, Engine, EngineConfig};

/// Scripted walkthrough against the in-memory gateway: login, take a short
/// exam, finish, and show the resulting history.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match EngineConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "configuration load failed, using defaults");
            EngineConfig::default()
        }
    };

    let gateway = Arc::new(InMemoryGateway::new());
    seed_demo_data(&gateway);

    let mut engine = Engine::new(config, gateway);
    engine.bootstrap().await?;

    engine
        .dispatch(Command::Login {
            name: "Alice".into(),
        })
        .await?;
    engine
        .dispatch(Command::StartExam {
            subject_id: "math".into(),
            category_id: "basics".into(),
        })
        .await?;

    // answer every question with its first option, then finish
    let question_ids: Vec<String> = engine
        .state()
        .exam_session
        .as_ref()
        .map(|session| session.questions.iter().map(|q| q.id.clone()).collect())
        .unwrap_or_default();
    for question_id in question_ids {
        engine
            .dispatch(Command::SelectAnswer {
                question_id,
                option_index: 0,
            })
            .await?;
        engine.dispatch(Command::NextQuestion).await?;
    }
    engine.dispatch(Command::FinishExam).await?;

    if let Some(result) = engine.state().last_result.as_ref() {
        tracing::info!(
            subject = %result.subject,
            category = %result.category,
            score = result.score,
            correct = result.correct_count,
            total = result.total_questions,
            "exam complete"
        );
    }
    for average in &engine.state().subject_averages {
        tracing::info!(
            subject = %average.subject,
            average = average.average_score,
            attempts = average.attempts,
            "subject average"
        );
    }

    engine.dispatch(Command::Logout).await?;
    Ok(())
}

fn seed_demo_data(gateway: &InMemoryGateway) {
    gateway.seed(Collection::Subjects, "math", json!({ "name": "Mathematics" }));
    gateway.seed(
        Collection::Categories,
        "basics",
        json!({ "subject_id": "math", "name": "Basics", "time_limit_minutes": 5 }),
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
}
