//! Error types surfaced to gateway callers.
//!
//! Every caller-visible failure maps to the JSON error envelope
//! `{"error": {"type": <kind>, "message": <text>, ...}}`. Internal
//! best-effort failures (vault, recorder, chain, alerts, telemetry) are
//! logged with the run id and never reach this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::guardrails::detection::Violation;

/// Errors returned to the caller of the proxy surface.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Gateway key missing or mismatched (401).
    #[error("unauthorized: invalid or missing gateway key")]
    Unauthorized,

    /// The request body could not be read or is unusable (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A prevention policy rejected the request outright (403).
    #[error("prevention policy blocked: {0}")]
    PreventionBlocked(String),

    /// A detection rule fired and was not overridden by approval (429).
    #[error("guardrail triggered: {}", .0.message)]
    GuardrailTriggered(Violation),

    /// The upstream provider could not be reached or read (502).
    #[error("upstream: {0}")]
    Upstream(String),
}

impl GatewayError {
    /// The error kind string used in the JSON envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::PreventionBlocked(_) => "prevention_policy_blocked",
            GatewayError::GuardrailTriggered(_) => "agent_guardrail_triggered",
            GatewayError::Upstream(_) => "upstream",
        }
    }

    /// The HTTP status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PreventionBlocked(_) => StatusCode::FORBIDDEN,
            GatewayError::GuardrailTriggered(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::GuardrailTriggered(v) => json!({
                "error": {
                    "type": self.kind(),
                    "rule": v.rule,
                    "message": v.message,
                    "session_id": v.session_id,
                    "details": v.details,
                }
            }),
            GatewayError::PreventionBlocked(reason) => json!({
                "error": {
                    "type": self.kind(),
                    "message": reason,
                }
            }),
            other => json!({
                "error": {
                    "type": other.kind(),
                    "message": other.to_string(),
                }
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
