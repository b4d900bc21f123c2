//! SSE streaming with a recording mirror.
//!
//! Upstream bytes are forwarded to the client as they arrive while an
//! identical copy accumulates in a buffer owned by the copy task. The two
//! writes share no mutable state; the mirror lives on after the handler
//! returns and feeds the background recorder. Client disconnection aborts
//! the copy loop — partial recording with whatever was captured still
//! happens.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use opentelemetry::global::BoxedSpan;
use opentelemetry::trace::Span;
use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::recorder::RunStatus;
use crate::telemetry;

use super::record::{spawn_background_record, RecordContext};
use super::Gateway;

/// Parameters carried from the handler into the copy task.
pub struct StreamContext {
    pub run_id: String,
    pub trace_id: String,
    pub model: String,
    pub provider: &'static str,
    pub endpoint: &'static str,
    pub session_id: Option<String>,
    pub request_body: Bytes,
    pub started_at: DateTime<Utc>,
}

/// Forward an SSE upstream response to the client while mirroring every
/// chunk for recording. Returns the response to hand to the client; the
/// copy loop runs in its own task.
pub fn stream_response(
    gateway: Arc<Gateway>,
    mut upstream: reqwest::Response,
    response_headers: HeaderMap,
    ctx: StreamContext,
    mut span: BoxedSpan,
) -> Response {
    let upstream_status = upstream.status();
    let is_error = upstream_status.as_u16() >= 400;

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);

    tokio::spawn(async move {
        let mut mirror: Vec<u8> = Vec::new();
        let mut client_gone = false;

        loop {
            match upstream.chunk().await {
                Ok(Some(chunk)) => {
                    mirror.extend_from_slice(&chunk);
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Client went away; stop copying, keep the partial
                        // mirror for recording.
                        client_gone = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(run_id = %ctx.run_id, error = %e, "stream read error");
                    break;
                }
            }
        }
        drop(tx);

        let duration_ms = (Utc::now() - ctx.started_at).num_milliseconds().max(0) as u64;
        let tokens = super::extract::extract_stream_tokens(&mirror);

        span.set_attribute(KeyValue::new(telemetry::GEN_AI_STREAM, true));
        if tokens.total > 0 {
            span.set_attribute(KeyValue::new(
                telemetry::GEN_AI_USAGE_PROMPT_TOKENS,
                tokens.prompt as i64,
            ));
            span.set_attribute(KeyValue::new(
                telemetry::GEN_AI_USAGE_COMPLETION_TOKENS,
                tokens.completion as i64,
            ));
        }
        telemetry::finish_call_span(&mut span, duration_ms, is_error, "upstream error status");

        let status = if is_error {
            RunStatus::Error
        } else {
            RunStatus::Success
        };

        info!(
            run_id = %ctx.run_id,
            endpoint = ctx.endpoint,
            model = %ctx.model,
            tokens = tokens.total,
            duration_ms,
            status = status.as_str(),
            stream = true,
            client_gone,
            "proxied"
        );

        if let (Some(sessions), Some(session_id)) = (&gateway.sessions, &ctx.session_id) {
            sessions.record_response(session_id, 0, is_error);
        }

        spawn_background_record(
            Arc::clone(&gateway),
            RecordContext {
                run_id: ctx.run_id,
                trace_id: ctx.trace_id,
                model: ctx.model,
                provider: ctx.provider,
                endpoint: ctx.endpoint,
                request_body: ctx.request_body,
                response_body: Some(Bytes::from(mirror)),
                started_at: ctx.started_at,
                status,
                http_status: Some(upstream_status.as_u16()),
                error: String::new(),
            },
        );
    });

    let body_stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::OK))
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive");

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &response_headers {
            headers.insert(name.clone(), value.clone());
        }
    }

    builder
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Body::empty())
                .expect("static response builds")
        })
}
