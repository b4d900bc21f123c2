//! Configurable OpenAI-shaped mock upstream.
//!
//! Serves `/v1/chat/completions` and `/v1/responses` with a preconfigured
//! status and body (plain JSON or SSE), while recording every request it
//! receives for later assertions.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::stream;
use serde_json::Value;
use tokio::sync::RwLock;

/// Builder for the mock upstream.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    status: u16,
    body: String,
    sse_chunks: Option<Vec<String>>,
}

#[derive(Debug)]
struct MockState {
    status: u16,
    body: String,
    sse_chunks: Option<Vec<String>>,
    request_count: RwLock<u32>,
    last_body: RwLock<Option<Vec<u8>>>,
    last_authorization: RwLock<Option<String>>,
}

impl MockUpstream {
    /// A 200 responder with the given JSON body.
    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            sse_chunks: None,
        }
    }

    /// A responder with an explicit status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// An SSE responder emitting each chunk as a `data:` line, followed by
    /// `[DONE]`.
    pub fn sse(chunks: Vec<String>) -> Self {
        Self {
            status: 200,
            body: String::new(),
            sse_chunks: Some(chunks),
        }
    }

    /// Start the server on an ephemeral port.
    pub async fn start(self) -> (SocketAddr, MockUpstreamHandle) {
        let state = Arc::new(MockState {
            status: self.status,
            body: self.body,
            sse_chunks: self.sse_chunks,
            request_count: RwLock::new(0),
            last_body: RwLock::new(None),
            last_authorization: RwLock::new(None),
        });

        let app = Router::new()
            .route("/v1/chat/completions", post(handle))
            .route("/v1/responses", post(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, MockUpstreamHandle { state })
    }
}

/// Handle to a running mock upstream for assertions.
pub struct MockUpstreamHandle {
    state: Arc<MockState>,
}

impl MockUpstreamHandle {
    pub async fn request_count(&self) -> u32 {
        *self.state.request_count.read().await
    }

    pub async fn last_body(&self) -> Option<Vec<u8>> {
        self.state.last_body.read().await.clone()
    }

    pub async fn last_body_json(&self) -> Option<Value> {
        self.last_body()
            .await
            .and_then(|b| serde_json::from_slice(&b).ok())
    }

    pub async fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.read().await.clone()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> Response {
    {
        let mut count = state.request_count.write().await;
        *count += 1;
    }
    {
        let mut last = state.last_body.write().await;
        *last = Some(body.to_vec());
    }
    {
        let mut auth = state.last_authorization.write().await;
        *auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
    }

    if let Some(chunks) = &state.sse_chunks {
        let events: Vec<Result<Event, Infallible>> = chunks
            .iter()
            .map(|c| Ok(Event::default().data(c.clone())))
            .chain(std::iter::once(Ok(Event::default().data("[DONE]"))))
            .collect();
        return Sse::new(stream::iter(events)).into_response();
    }

    (
        StatusCode::from_u16(state.status).unwrap(),
        [
            ("content-type", "application/json"),
            ("x-request-id", "req_mock_123"),
            ("openai-organization", "org-mock"),
        ],
        state.body.clone(),
    )
        .into_response()
}
