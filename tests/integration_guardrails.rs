//! Guardrails pipeline tests: prevention blocks, loop detection, error
//! spirals, approval override.

mod helpers;

use helpers::fixtures;
use helpers::mock_upstream::MockUpstream;
use helpers::{base_gateway, run_id_of, spawn_gateway, with_guardrails};

use airgate::guardrails::config::{GuardrailsConfig, RedactMode};
use axum::routing::post;
use axum::Json;
use serde_json::json;

fn pii_block_config() -> GuardrailsConfig {
    let mut cfg = GuardrailsConfig::default();
    cfg.prevention.pii.enabled = true;
    cfg.prevention.pii.block_ssn = true;
    cfg.prevention.pii.redact_mode = RedactMode::Block;
    cfg
}

fn loop_config() -> GuardrailsConfig {
    let mut cfg = GuardrailsConfig::default();
    cfg.loop_detection.similar_prompt_threshold = 0.80;
    cfg.loop_detection.max_similar_prompts = 3;
    cfg.loop_detection.window_seconds = 60;
    cfg
}

#[tokio::test]
async fn pii_block_returns_403_without_calling_upstream() {
    let (upstream_addr, upstream) =
        MockUpstream::json(&fixtures::happy_path().upstream_response).start().await;

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        pii_block_config(),
    );
    let addr = spawn_gateway(gateway).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "My SSN is 123-45-6789"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    assert!(!run_id_of(&response).is_empty());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "prevention_policy_blocked");

    // No upstream call was made.
    assert_eq!(upstream.request_count().await, 0);
}

#[tokio::test]
async fn pii_redact_forwards_scrubbed_prompt() {
    let (upstream_addr, upstream) =
        MockUpstream::json(&fixtures::happy_path().upstream_response).start().await;

    let mut cfg = pii_block_config();
    cfg.prevention.pii.redact_mode = RedactMode::Redact;

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        cfg,
    );
    let addr = spawn_gateway(gateway).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "My SSN is 123-45-6789"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let forwarded = upstream.last_body_json().await.unwrap();
    assert_eq!(forwarded["messages"][0]["content"], "My SSN is [SSN]");
}

#[tokio::test]
async fn fourth_identical_prompt_triggers_prompt_loop() {
    let (upstream_addr, _upstream) =
        MockUpstream::json(&fixtures::happy_path().upstream_response).start().await;

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        loop_config(),
    );
    let addr = spawn_gateway(gateway).await;

    let client = reqwest::Client::new();
    let prompt = "please help me fix the authentication error in my code";
    let request = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": prompt}]
    });

    for i in 0..3 {
        let response = client
            .post(format!("http://{addr}/v1/chat/completions"))
            .header("x-session-id", "loop-session")
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "request {i} should pass");
    }

    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .header("x-session-id", "loop-session")
        .json(&request)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 429);
    assert!(!run_id_of(&response).is_empty());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "agent_guardrail_triggered");
    assert_eq!(body["error"]["rule"], "prompt_loop");
    assert_eq!(body["error"]["session_id"], "loop-session");

    // The violating session was removed; the next request starts fresh.
    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .header("x-session-id", "loop-session")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn error_spiral_halts_after_consecutive_upstream_errors() {
    let (upstream_addr, _upstream) = MockUpstream::json(r#"{"error":"boom"}"#)
        .with_status(500)
        .start()
        .await;

    let mut cfg = GuardrailsConfig::default();
    cfg.retry_protection.max_consecutive_errors = 3;

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        cfg,
    );
    let addr = spawn_gateway(gateway).await;

    let client = reqwest::Client::new();
    let request = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "try again"}]
    });

    // Three failing upstream calls accumulate consecutive errors.
    for _ in 0..3 {
        let response = client
            .post(format!("http://{addr}/v1/chat/completions"))
            .header("x-session-id", "spiral")
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
    }

    // The fourth attempt is halted before reaching upstream.
    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .header("x-session-id", "spiral")
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 429);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["rule"], "error_spiral");
}

#[tokio::test]
async fn approval_webhook_overrides_a_violation() {
    let (upstream_addr, upstream) =
        MockUpstream::json(&fixtures::happy_path().upstream_response).start().await;

    // Approval endpoint that approves everything.
    let approval_app = axum::Router::new().route(
        "/approve",
        post(|| async { Json(json!({"approved": true, "reason": "operator ok"})) }),
    );
    let approval_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let approval_addr = approval_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(approval_listener, approval_app).await.unwrap();
    });

    let mut cfg = loop_config();
    cfg.prevention.approval.enabled = true;
    cfg.prevention.approval.webhook_url = format!("http://{approval_addr}/approve");
    cfg.prevention.approval.timeout_seconds = 5;
    cfg.prevention.approval.rules = vec!["prompt_loop".to_string()];

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        cfg,
    );
    let addr = spawn_gateway(gateway).await;

    let client = reqwest::Client::new();
    let request = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "the exact same prompt every time"}]
    });

    // All four identical prompts go through: the violation on the fourth
    // is approved by the webhook.
    for _ in 0..4 {
        let response = client
            .post(format!("http://{addr}/v1/chat/completions"))
            .header("x-session-id", "approved-loop")
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
    assert_eq!(upstream.request_count().await, 4);
}

#[tokio::test]
async fn tool_filter_blocks_when_everything_is_denied() {
    let (upstream_addr, upstream) =
        MockUpstream::json(&fixtures::happy_path().upstream_response).start().await;

    let mut cfg = GuardrailsConfig::default();
    cfg.prevention.tools.enabled = true;
    cfg.prevention.tools.blocklist = vec!["shell".to_string()];

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        cfg,
    );
    let addr = spawn_gateway(gateway).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "run a command"}],
            "tools": [{"type": "function", "function": {"name": "shell"}}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(upstream.request_count().await, 0);
}
