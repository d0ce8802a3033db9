//! HTTP surface tests
//!
//! Drives the warp routes in-process with `warp::test`:
//! - bearer authentication and that rejected requests never touch the registry
//! - kickoff, status polling and terminal snapshots
//! - request validation and error bodies
//! - CORS and the open health/metrics endpoints, including LLM reachability


use diagnosis_crew::api;
use diagnosis_crew::testing::{MockLlmProvider, ScriptedCrewFactory};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;

#[tokio::test]
async fn test_kickoff_without_token_is_rejected_and_creates_nothing() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(3));
    let routes = api::routes(state, TEST_ORIGIN);

    let response = warp::test::request()
        .method("POST")
        .path("/kickoff")
        .json(&kickoff_body("chest pain"))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 401);
    assert_eq!(
        json_body(&response),
        serde_json::json!({ "detail": "Invalid token" })
    );
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_kickoff_with_wrong_token_is_rejected_before_body_parsing() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(3));
    let routes = api::routes(state, TEST_ORIGIN);

    for header in ["Bearer wrong-token", "Basic dGVzdA==", "Bearer", TEST_TOKEN] {
        let response = warp::test::request()
            .method("POST")
            .path("/kickoff")
            .header("authorization", header)
            .body("{ not json")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 401, "header {header:?}");
    }

    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_status_requires_token() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1).gated());
    let task_id = kickoff(&state, "fever").await;
    let routes = api::routes(state, TEST_ORIGIN);

    let response = warp::test::request()
        .path(&format!("/status/{task_id}"))
        .header("authorization", "Bearer nope")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 401);
    assert_eq!(json_body(&response)["detail"], "Invalid token");
}

#[tokio::test]
async fn test_kickoff_returns_running_task_immediately() {
    let factory = ScriptedCrewFactory::new(3).gated();
    let gate = factory.gate();
    let (registry, state) = test_api(factory);

    let task_id = kickoff(&state, "shortness of breath").await;
    uuid::Uuid::parse_str(&task_id).expect("task id should be a UUID");

    let routes = api::routes(state, TEST_ORIGIN);
    let response = warp::test::request()
        .path(&format!("/status/{task_id}"))
        .header("authorization", bearer())
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    let body = json_body(&response);
    assert_eq!(body["status"], "running");
    assert!(body["result"].is_null());
    assert!(body["error"].is_null());
    assert_eq!(body["subtasks"], serde_json::json!({}));
    assert_eq!(body["tasks_output"], serde_json::json!([]));
    assert_eq!(body["token_usage"], serde_json::json!({}));

    gate.add_permits(3);
    wait_for_terminal(&registry, &task_id).await;
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state, TEST_ORIGIN);

    let response = warp::test::request()
        .path("/status/does-not-exist")
        .header("authorization", bearer())
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 404);
    assert_eq!(
        json_body(&response),
        serde_json::json!({ "detail": "Task not found" })
    );
}

#[tokio::test]
async fn test_invalid_kickoff_bodies_are_unprocessable() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state, TEST_ORIGIN);

    for body in [
        serde_json::json!({}),
        serde_json::json!({ "inputs": {} }),
        serde_json::json!({ "inputs": { "chief_complaint": 42 } }),
        serde_json::json!({ "chief_complaint": "headache" }),
    ] {
        let response = warp::test::request()
            .method("POST")
            .path("/kickoff")
            .header("authorization", bearer())
            .json(&body)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 422, "body {body}");
        assert!(json_body(&response)["detail"].is_string());
    }

    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state, TEST_ORIGIN);

    let complaint = "a".repeat(70 * 1024);
    let response = warp::test::request()
        .method("POST")
        .path("/kickoff")
        .header("authorization", bearer())
        .json(&kickoff_body(&complaint))
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 413);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_polling_until_completion() {
    let factory = ScriptedCrewFactory::new(5).with_step_delay(Duration::from_millis(5));
    let (_, state) = test_api(factory);
    let task_id = kickoff(&state, "palpitations").await;
    let routes = api::routes(state, TEST_ORIGIN);

    let mut previous_outputs: Vec<serde_json::Value> = Vec::new();
    let final_body = loop {
        let response = warp::test::request()
            .path(&format!("/status/{task_id}"))
            .header("authorization", bearer())
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        let body = json_body(&response);

        let outputs = body["tasks_output"].as_array().cloned().unwrap_or_default();
        assert!(outputs.len() >= previous_outputs.len());
        assert_eq!(&outputs[..previous_outputs.len()], &previous_outputs[..]);
        previous_outputs = outputs;

        if body["status"] != "running" {
            break body;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };

    assert_eq!(final_body["status"], "completed");
    assert_eq!(final_body["result"], "output 5 for palpitations");
    assert!(final_body["error"].is_null());
    assert_eq!(final_body["tasks_output"].as_array().unwrap().len(), 5);
    assert_eq!(final_body["subtasks"].as_object().unwrap().len(), 5);
    assert_eq!(
        final_body["subtasks"]["Scripted step 1"],
        serde_json::json!({
            "status": "completed",
            "description": "Scripted step 1",
            "summary": "Expected output 1"
        })
    );
    assert_eq!(final_body["token_usage"]["total_tokens"], 75);
    assert_eq!(final_body["token_usage"]["successful_requests"], 5);
}

#[tokio::test]
async fn test_terminal_snapshots_are_byte_identical() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(2));
    let task_id = kickoff(&state, "cough").await;
    wait_for_terminal(&registry, &task_id).await;

    let routes = api::routes(state, TEST_ORIGIN);
    let mut bodies = Vec::new();
    for _ in 0..3 {
        let response = warp::test::request()
            .path(&format!("/status/{task_id}"))
            .header("authorization", bearer())
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        bodies.push(response.body().clone());
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
}

#[tokio::test]
async fn test_failed_run_reports_error_and_partial_progress() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(5).failing_at(3));
    let task_id = kickoff(&state, "back pain").await;
    wait_for_terminal(&registry, &task_id).await;

    let routes = api::routes(state, TEST_ORIGIN);
    let response = warp::test::request()
        .path(&format!("/status/{task_id}"))
        .header("authorization", bearer())
        .reply(&routes)
        .await;
    let body = json_body(&response);

    assert_eq!(body["status"], "failed");
    assert!(body["result"].is_null());
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert!(body["tasks_output"].as_array().unwrap().len() <= 2);
    assert_eq!(body["token_usage"], serde_json::json!({}));
}

#[tokio::test]
async fn test_concurrent_kickoffs_get_distinct_ids_and_results() {
    let (registry, state) = test_api(ScriptedCrewFactory::new(3));

    let complaints: Vec<String> = (0..10).map(|i| format!("complaint-{i}")).collect();
    let ids = join_all(complaints.iter().map(|c| kickoff(&state, c))).await;

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    for (task_id, complaint) in ids.iter().zip(&complaints) {
        let status = wait_for_terminal(&registry, task_id).await;
        assert_eq!(
            status.result,
            Some(serde_json::Value::String(format!("output 3 for {complaint}")))
        );
        assert!(status
            .tasks_output
            .iter()
            .all(|entry| entry.output.ends_with(complaint.as_str())));
    }
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state, TEST_ORIGIN);

    let response = warp::test::request()
        .method("OPTIONS")
        .path("/kickoff")
        .header("origin", TEST_ORIGIN)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization, content-type")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        TEST_ORIGIN
    );
    assert_eq!(
        response.headers()["access-control-allow-credentials"],
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_other_origins() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state, TEST_ORIGIN);

    let response = warp::test::request()
        .path("/health")
        .header("origin", "http://evil.example")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_health_and_metrics_are_open() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1));
    kickoff(&state, "dizziness").await;
    let routes = api::routes(state, TEST_ORIGIN);

    let health = warp::test::request().path("/health").reply(&routes).await;
    assert_eq!(health.status(), 200);
    let body = json_body(&health);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tasks_tracked"], 1);
    assert!(body["timestamp"].is_string());

    let metrics = warp::test::request().path("/metrics").reply(&routes).await;
    assert_eq!(metrics.status(), 200);
    assert!(json_body(&metrics)["tasks_started"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_health_reports_llm_reachability() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state.clone(), TEST_ORIGIN);
    let body = json_body(&warp::test::request().path("/health").reply(&routes).await);
    assert!(body.get("llm").is_none());

    let reachable = state
        .clone()
        .with_llm(Arc::new(MockLlmProvider::single_response("ok")));
    let routes = api::routes(reachable, TEST_ORIGIN);
    let body = json_body(&warp::test::request().path("/health").reply(&routes).await);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["llm"], "ok");

    let unreachable = state.with_llm(Arc::new(MockLlmProvider::with_failure()));
    let routes = api::routes(unreachable, TEST_ORIGIN);
    let response = warp::test::request().path("/health").reply(&routes).await;
    assert_eq!(response.status(), 200);
    let body = json_body(&response);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["llm"], "unreachable");
}

#[tokio::test]
async fn test_wrong_method_and_unknown_path() {
    let (_, state) = test_api(ScriptedCrewFactory::new(1));
    let routes = api::routes(state, TEST_ORIGIN);

    let response = warp::test::request()
        .method("GET")
        .path("/kickoff")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 405);

    let response = warp::test::request().path("/nowhere").reply(&routes).await;
    assert_eq!(response.status(), 404);
    assert_eq!(json_body(&response)["detail"], "Not found");
}
