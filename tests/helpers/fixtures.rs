//! Golden fixtures: request bodies paired with the upstream response and
//! the expected AIR record fields.

#![allow(dead_code)]

use serde_json::json;

/// A single golden scenario.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: &'static str,
    pub request_body: String,
    pub upstream_response: String,
    pub upstream_status: u16,
    pub expected_model: &'static str,
    pub expected_provider: &'static str,
    pub expected_status: &'static str,
    pub expected_tokens: u64,
}

/// Standard single-turn chat completion.
pub fn happy_path() -> Fixture {
    Fixture {
        name: "happy_path",
        request_body: json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "What is the capital of France?"}]
        })
        .to_string(),
        upstream_response: json!({
            "id": "chatcmpl-abc123",
            "model": "gpt-4o-mini",
            "choices": [
                {"message": {"role": "assistant", "content": "The capital of France is Paris."}}
            ],
            "usage": {"prompt_tokens": 14, "completion_tokens": 8, "total_tokens": 22}
        })
        .to_string(),
        upstream_status: 200,
        expected_model: "gpt-4o-mini",
        expected_provider: "openai",
        expected_status: "success",
        expected_tokens: 22,
    }
}

/// Multi-turn conversation with tool_calls and tool responses.
pub fn tool_call_chain() -> Fixture {
    Fixture {
        name: "tool_call_chain",
        request_body: json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "What's the weather in NYC?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_001", "type": "function",
                     "function": {"name": "get_weather", "arguments": "{\"city\":\"NYC\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_001",
                 "content": "{\"temp\":72,\"condition\":\"sunny\"}"},
                {"role": "user", "content": "And in London?"}
            ]
        })
        .to_string(),
        upstream_response: json!({
            "id": "chatcmpl-tool456",
            "model": "gpt-4o",
            "choices": [
                {"message": {"role": "assistant", "tool_calls": [
                    {"id": "call_002", "type": "function",
                     "function": {"name": "get_weather", "arguments": "{\"city\":\"London\"}"}}
                ]}}
            ],
            "usage": {"prompt_tokens": 85, "completion_tokens": 22, "total_tokens": 107}
        })
        .to_string(),
        upstream_status: 200,
        expected_model: "gpt-4o",
        expected_provider: "openai",
        expected_status: "success",
        expected_tokens: 107,
    }
}

/// A request containing PII (SSN, email, account numbers).
pub fn sensitive_payload() -> Fixture {
    Fixture {
        name: "sensitive_payload",
        request_body: json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content":
                "My SSN is 123-45-6789, email is john@example.com, account #ACC-9876543210. Please verify my identity."}]
        })
        .to_string(),
        upstream_response: json!({
            "id": "chatcmpl-pii789",
            "model": "gpt-4o-mini",
            "choices": [
                {"message": {"role": "assistant", "content": "I've verified your identity. Your account is active."}}
            ],
            "usage": {"prompt_tokens": 42, "completion_tokens": 12, "total_tokens": 54}
        })
        .to_string(),
        upstream_status: 200,
        expected_model: "gpt-4o-mini",
        expected_provider: "openai",
        expected_status: "success",
        expected_tokens: 54,
    }
}

/// Upstream failure propagated to the caller.
pub fn upstream_error() -> Fixture {
    Fixture {
        name: "upstream_error",
        request_body: json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "trigger an error"}]
        })
        .to_string(),
        upstream_response: r#"{"error":"internal"}"#.to_string(),
        upstream_status: 500,
        expected_model: "gpt-4o-mini",
        expected_provider: "openai",
        expected_status: "error",
        expected_tokens: 0,
    }
}

/// A ~50KB request body for large content handling.
pub fn huge_payload() -> Fixture {
    let mut large_content = String::new();
    for i in 0..500 {
        large_content.push_str(&format!(
            "This is line {} of a very large payload for stress testing the gateway proxy. ",
            (b'A' + (i % 26) as u8) as char
        ));
    }

    Fixture {
        name: "huge_payload",
        request_body: json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": large_content}]
        })
        .to_string(),
        upstream_response: json!({
            "id": "chatcmpl-huge",
            "model": "gpt-4o-mini",
            "choices": [
                {"message": {"role": "assistant", "content": "Understood."}}
            ],
            "usage": {"prompt_tokens": 9000, "completion_tokens": 3, "total_tokens": 9003}
        })
        .to_string(),
        upstream_status: 200,
        expected_model: "gpt-4o-mini",
        expected_provider: "openai",
        expected_status: "success",
        expected_tokens: 9003,
    }
}
