//! HTTP handlers for the proxy surface.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use opentelemetry::trace::Span;
use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::guardrails::{alerts, approval, detection, prevention, router};
use crate::recorder::RunStatus;
use crate::telemetry;
use crate::trust::{self, Framework};

use super::extract::{
    extract_prompt_text, extract_session_id, extract_tool_names, infer_provider, MinimalRequest,
};
use super::record::{spawn_background_record, RecordContext};
use super::streaming::{stream_response, StreamContext};
use super::{authenticate_gateway, Gateway};

/// Reading the request body is bounded; request bodies are buffered JSON,
/// never streams.
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);

const CHAT_COMPLETIONS: &str = "/v1/chat/completions";
const RESPONSES: &str = "/v1/responses";

/// Frameworks evaluated for the audit endpoints.
const AUDIT_FRAMEWORKS: &[Framework] = &[Framework::Soc2, Framework::Iso27001];

pub async fn chat_completions(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
) -> Response {
    proxy_endpoint(gateway, request, CHAT_COMPLETIONS).await
}

pub async fn responses(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    proxy_endpoint(gateway, request, RESPONSES).await
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Current chain state plus the compliance summary.
pub async fn audit(State(gateway): State<Arc<Gateway>>, headers: HeaderMap) -> Response {
    if let Err(e) = authenticate_gateway(&headers, gateway.gateway_key.as_deref()) {
        return e.into_response();
    }

    let (chain_length, verification) = match &gateway.chain {
        Some(chain) => (chain.len(), chain.verify()),
        None => (0, crate::trust::AuditChain::new("").verify()),
    };

    let report = trust::evaluate_compliance(
        AUDIT_FRAMEWORKS,
        chain_length,
        gateway.vault.is_some(),
        gateway.guardrails.is_some(),
        gateway.analytics.is_some(),
    );

    let mut body = json!({
        "chain_length": chain_length,
        "chain_valid": verification.valid,
        "compliance": report.summary,
    });
    if !verification.valid {
        body["chain_broken_at"] = json!(verification.broken_at);
        body["chain_error"] = json!(verification.reason);
    }

    Json(body).into_response()
}

/// Signed evidence package for regulator export.
pub async fn audit_export(State(gateway): State<Arc<Gateway>>, headers: HeaderMap) -> Response {
    if let Err(e) = authenticate_gateway(&headers, gateway.gateway_key.as_deref()) {
        return e.into_response();
    }

    let chain_length = gateway.chain.as_ref().map_or(0, |c| c.len());
    let report = trust::evaluate_compliance(
        AUDIT_FRAMEWORKS,
        chain_length,
        gateway.vault.is_some(),
        gateway.guardrails.is_some(),
        gateway.analytics.is_some(),
    );

    let package = match &gateway.chain {
        Some(chain) => trust::generate_evidence_package(
            chain,
            report,
            &gateway.gateway_id,
            &gateway.signing_key,
        ),
        None => {
            let empty = crate::trust::AuditChain::new("");
            trust::generate_evidence_package(
                &empty,
                report,
                &gateway.gateway_id,
                &gateway.signing_key,
            )
        }
    };

    Json(package).into_response()
}

/// Attach the run id to an error envelope; every response from the proxy
/// endpoints carries a non-empty `x-run-id`, rejections included.
fn error_response(run_id: &str, err: GatewayError) -> Response {
    let mut response = err.into_response();
    if let Ok(value) = run_id.parse() {
        response.headers_mut().insert("x-run-id", value);
    }
    response
}

/// The full request pipeline for one proxy endpoint.
async fn proxy_endpoint(
    gateway: Arc<Gateway>,
    request: Request,
    endpoint: &'static str,
) -> Response {
    let (parts, body) = request.into_parts();
    let headers = parts.headers;

    let started_at = Utc::now();
    let run_id = Uuid::new_v4().to_string();

    if let Err(e) = authenticate_gateway(&headers, gateway.gateway_key.as_deref()) {
        return error_response(&run_id, e);
    }

    let mut span = telemetry::start_call_span(&run_id, endpoint);
    let trace_id = if gateway.telemetry_enabled {
        telemetry::trace_id_hex(&span)
    } else {
        String::new()
    };

    // Read the whole body up front; streaming request bodies are not
    // expected on these endpoints.
    let read = tokio::time::timeout(
        BODY_READ_TIMEOUT,
        axum::body::to_bytes(body, usize::MAX),
    )
    .await;
    let mut req_body: Bytes = match read {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            span.end();
            return error_response(
                &run_id,
                GatewayError::BadRequest(format!("failed to read request: {e}")),
            );
        }
        Err(_) => {
            span.end();
            return error_response(
                &run_id,
                GatewayError::BadRequest("failed to read request: timed out".into()),
            );
        }
    };

    let mut req = MinimalRequest::parse(&req_body);
    if !req.model.is_empty() {
        span.set_attribute(KeyValue::new(
            telemetry::GEN_AI_REQUEST_MODEL,
            req.model.clone(),
        ));
    }

    let provider = infer_provider(&req.model, &gateway.provider_url);
    span.set_attribute(KeyValue::new(telemetry::GEN_AI_SYSTEM, provider.as_str()));

    // --- Prevention layer (opt-in) ---
    // May rewrite the body (PII redaction, tool filtering, model
    // downgrade) or block with 403.
    if let Some(cfg) = &gateway.guardrails {
        let session_id = extract_session_id(&headers);
        let prompt_text = extract_prompt_text(req.messages.as_ref());
        let tool_names = extract_tool_names(&req_body);
        let session_tokens = gateway
            .sessions
            .as_ref()
            .map_or(0, |s| s.session_tokens(&session_id));

        let result = prevention::evaluate(
            cfg,
            &req_body,
            &prompt_text,
            &tool_names,
            &req.model,
            session_tokens,
        );

        if result.blocked {
            warn!(session_id = %session_id, reason = %result.block_reason, "prevention blocked");
            alerts::send_webhook_alert(
                &cfg.alerts.webhook_url,
                &detection::Violation {
                    rule: detection::Rule::Prevention,
                    message: result.block_reason.clone(),
                    session_id,
                    details: serde_json::Map::new(),
                },
            );
            span.end();
            return error_response(&run_id, GatewayError::PreventionBlocked(result.block_reason));
        }

        if let Some(modified) = result.modified_body {
            req_body = Bytes::from(modified);
            req = MinimalRequest::parse(&req_body);
            info!(
                pii_redacted = result.pii_redacted,
                tools_filtered = result.tools_filtered,
                model_downgraded = result.model_downgraded.as_deref().unwrap_or(""),
                "prevention modified request"
            );
        }
    }

    // --- Routing layer (opt-in) ---
    // Analytics-driven model swap, evaluated before detection.
    if let (Some(cfg), Some(tracker)) = (&gateway.guardrails, &gateway.analytics) {
        let decision = router::evaluate_routing(&cfg.optimization, Some(tracker), &req.model);
        if decision.rerouted() {
            info!(
                from = %decision.original_model,
                to = %decision.routed_model,
                rule = %decision.rule,
                reason = %decision.reason,
                "model rerouted"
            );
            match rewrite_model(&req_body, &decision.routed_model) {
                Ok(body) => {
                    req_body = Bytes::from(body);
                    req = MinimalRequest::parse(&req_body);
                }
                Err(e) => warn!(error = %e, "routing: failed to rewrite model"),
            }
        }
    }

    // --- Detection layer (opt-in) ---
    // Session update happens before evaluation; violations return 429
    // unless the approval webhook overrides.
    let mut session_for_response: Option<String> = None;
    if let (Some(cfg), Some(sessions)) = (&gateway.guardrails, &gateway.sessions) {
        let session_id = extract_session_id(&headers);
        // Snapshot before this request's own contribution; rules count
        // prior activity, so the Nth repeat of a pattern is the one that
        // trips a threshold of N-1 priors.
        let snapshot = sessions.get_or_create(&session_id);

        let prompt_text = extract_prompt_text(req.messages.as_ref());
        let tool_names = extract_tool_names(&req_body);
        sessions.record_request(&session_id, &prompt_text, &tool_names);

        let eval_req = detection::EvalRequest {
            prompt_text: &prompt_text,
            tool_names: &tool_names,
        };
        if let Some(violation) =
            detection::evaluate_snapshot(cfg, &snapshot, &eval_req, Utc::now())
        {
            if approval::request_approval(&cfg.prevention.approval, &violation).await {
                info!(rule = %violation.rule, session_id = %session_id, "violation approved via webhook");
            } else {
                warn!(
                    rule = %violation.rule,
                    message = %violation.message,
                    session_id = %session_id,
                    "guardrail triggered"
                );
                alerts::send_webhook_alert(&cfg.alerts.webhook_url, &violation);
                sessions.remove(&session_id);
                span.end();
                return error_response(&run_id, GatewayError::GuardrailTriggered(violation));
            }
        }

        session_for_response = Some(session_id);
    }

    // --- Forward to the upstream provider ---
    let upstream_url = format!("{}{endpoint}", gateway.provider_url);
    let mut upstream_req = gateway
        .upstream
        .post(&upstream_url)
        .header("content-type", "application/json")
        .body(req_body.clone());
    if let Some(auth) = headers.get("authorization") {
        upstream_req = upstream_req.header("authorization", auth);
    }

    let upstream_resp = match upstream_req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            let detail = e.to_string();
            span.set_attribute(KeyValue::new("error", detail.clone()));
            span.end();

            // Failed calls still get an AIR record.
            spawn_background_record(
                Arc::clone(&gateway),
                RecordContext {
                    run_id: run_id.clone(),
                    trace_id,
                    model: req.model.clone(),
                    provider: provider.as_str(),
                    endpoint,
                    request_body: req_body,
                    response_body: None,
                    started_at,
                    status: RunStatus::Error,
                    http_status: None,
                    error: detail.clone(),
                },
            );

            return error_response(&run_id, GatewayError::Upstream(format!("upstream: {detail}")));
        }
    };

    // The run id header is always visible before the body, streaming or
    // not; selected upstream headers pass through.
    let mut response_headers = HeaderMap::new();
    response_headers.insert("x-run-id", run_id.parse().expect("uuid is a valid header"));
    for name in ["x-request-id", "openai-organization"] {
        if let Some(value) = upstream_resp.headers().get(name) {
            response_headers.insert(name, value.clone());
        }
    }

    let upstream_is_sse = upstream_resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        == Some("text/event-stream");

    if req.stream && upstream_is_sse {
        return stream_response(
            gateway,
            upstream_resp,
            response_headers,
            StreamContext {
                run_id,
                trace_id,
                model: req.model,
                provider: provider.as_str(),
                endpoint,
                session_id: session_for_response,
                request_body: req_body,
                started_at,
            },
            span,
        );
    }

    buffered_response(
        gateway,
        upstream_resp,
        response_headers,
        BufferedContext {
            run_id,
            trace_id,
            model: req.model,
            provider: provider.as_str(),
            endpoint,
            session_id: session_for_response,
            request_body: req_body,
            started_at,
        },
        span,
    )
    .await
}

struct BufferedContext {
    run_id: String,
    trace_id: String,
    model: String,
    provider: &'static str,
    endpoint: &'static str,
    session_id: Option<String>,
    request_body: Bytes,
    started_at: chrono::DateTime<Utc>,
}

/// Traditional non-streaming response: buffer the upstream body, extract
/// usage, relay status + body, then record in the background.
async fn buffered_response(
    gateway: Arc<Gateway>,
    upstream_resp: reqwest::Response,
    response_headers: HeaderMap,
    ctx: BufferedContext,
    mut span: opentelemetry::global::BoxedSpan,
) -> Response {
    let upstream_status = upstream_resp.status().as_u16();
    let is_error = upstream_status >= 400;

    let resp_body = match upstream_resp.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            span.end();
            return GatewayError::Upstream(format!("failed to read upstream response: {e}"))
                .into_response();
        }
    };

    let tokens = super::extract::parse_usage(&resp_body).unwrap_or_default();
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

    let duration_ms = (Utc::now() - ctx.started_at).num_milliseconds().max(0) as u64;
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
            response_body: Some(resp_body.clone()),
            started_at: ctx.started_at,
            status,
            http_status: Some(upstream_status),
            error: String::new(),
        },
    );

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(upstream_status).unwrap_or(StatusCode::BAD_GATEWAY))
        .header("content-type", "application/json");
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &response_headers {
            headers.insert(name.clone(), value.clone());
        }
    }

    builder
        .body(axum::body::Body::from(resp_body))
        .unwrap_or_else(|_| {
            GatewayError::Upstream("failed to build response".into()).into_response()
        })
}

/// Rewrite only the model field of a request body, preserving everything
/// else verbatim.
fn rewrite_model(body: &[u8], model: &str) -> Result<Vec<u8>, serde_json::Error> {
    let mut req: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;
    req.insert(
        "model".to_string(),
        serde_json::Value::String(model.to_string()),
    );
    serde_json::to_vec(&req)
}
