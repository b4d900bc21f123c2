//! Canned OpenAI-shaped upstream for local development.
//!
//! Answers `/v1/chat/completions` and `/v1/responses` with a fixed
//! completion (SSE when the request asks for `stream: true`) so the
//! gateway can be exercised without a provider key.

use std::convert::Infallible;

use axum::extract::Json;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use futures_util::stream;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "mock-llm", about = "Canned OpenAI-compatible upstream")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:9090")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let app = Router::new()
        .route("/v1/chat/completions", post(mock_chat))
        .route("/v1/responses", post(mock_chat))
        .route("/health", get(|| async { "OK" }));

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    tracing::info!(addr = %args.addr, "mock LLM listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn mock_chat(Json(payload): Json<Value>) -> Response {
    let model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("gpt-4o-mini")
        .to_string();
    let streaming = payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if streaming {
        let chunks = vec![
            json!({"choices": [{"delta": {"role": "assistant", "content": "The answer "}}], "model": model}),
            json!({"choices": [{"delta": {"content": "is mocked."}}], "model": model}),
            json!({
                "choices": [],
                "model": model,
                "usage": {"prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13}
            }),
        ];

        let events = chunks
            .into_iter()
            .map(|chunk| Ok::<Event, Infallible>(Event::default().data(chunk.to_string())))
            .chain(std::iter::once(Ok(Event::default().data("[DONE]"))));

        return Sse::new(stream::iter(events)).into_response();
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "The answer is mocked."},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13}
    }))
    .into_response()
}
