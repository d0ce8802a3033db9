//! End-to-end crew runs against a mocked OpenAI API
//!
//! Wires the real `LlmCrewFactory` and `OpenAiProvider` into the HTTP routes
//! and checks that the default five-step crew is tracked to completion, and
//! that provider failures surface as failed tasks.


use diagnosis_crew::crew::{CrewDefinition, CrewSettings, LlmCrewFactory};
use diagnosis_crew::llm::providers::openai::{OpenAiConfig, OpenAiProvider};
use diagnosis_crew::tasks::TaskState;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crew_factory(server: &MockServer) -> LlmCrewFactory {
    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_delay: Duration::from_millis(1),
    })
    .unwrap();

    LlmCrewFactory::new(
        CrewDefinition::default(),
        Arc::new(provider),
        CrewSettings {
            summary_chars: 20,
            ..CrewSettings::default()
        },
    )
    .unwrap()
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ],
        "usage": { "prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25 }
    }))
}

#[tokio::test]
async fn test_default_crew_runs_to_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("crushing chest pain"))
        .respond_with(completion("clinical note"))
        .expect(5)
        .mount(&server)
        .await;

    let (registry, state) = test_api(crew_factory(&server));
    let task_id = kickoff(&state, "crushing chest pain").await;
    let status = wait_for_terminal(&registry, &task_id).await;

    assert_eq!(status.status, TaskState::Completed);
    assert_eq!(
        status.result,
        Some(serde_json::Value::String("clinical note".to_string()))
    );
    assert_eq!(status.tasks_output.len(), 5);
    assert_eq!(status.subtasks.len(), 5);
    assert!(status
        .subtasks
        .values()
        .all(|s| s.summary.as_deref().is_some_and(|x| x.chars().count() <= 20)));
    assert_eq!(status.token_usage["total_tokens"], 125);
    assert_eq!(status.token_usage["prompt_tokens"], 100);
    assert_eq!(status.token_usage["completion_tokens"], 25);
    assert_eq!(status.token_usage["successful_requests"], 5);
}

#[tokio::test]
async fn test_provider_failure_fails_the_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("history"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("context length exceeded"))
        .with_priority(2)
        .mount(&server)
        .await;

    let (registry, state) = test_api(crew_factory(&server));
    let task_id = kickoff(&state, "syncope").await;
    let status = wait_for_terminal(&registry, &task_id).await;

    assert_eq!(status.status, TaskState::Failed);
    assert!(status.result.is_none());
    assert_eq!(status.tasks_output.len(), 2);
    let error = status.error.unwrap();
    assert!(error.contains("generate_differential_diagnosis_task"));
}

#[tokio::test]
async fn test_empty_completion_fails_the_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("   "))
        .mount(&server)
        .await;

    let (registry, state) = test_api(crew_factory(&server));
    let task_id = kickoff(&state, "fatigue").await;
    let status = wait_for_terminal(&registry, &task_id).await;

    assert_eq!(status.status, TaskState::Failed);
    assert!(status.tasks_output.is_empty());
    assert!(status.error.unwrap().contains("gather_history_task"));
}
