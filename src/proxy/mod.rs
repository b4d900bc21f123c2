//! Ingress pipeline: the OpenAI-compatible HTTP surface.
//!
//! The hot path per request is auth → prevention → detection → upstream
//! forward → response; recording runs as a detached task (see [`record`]).
//! Session store, analytics tracker, and audit chain are independent
//! components — the proxy orchestrates them and disabling one never
//! affects another.

pub mod extract;
pub mod handlers;
pub mod record;
pub mod streaming;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::error::GatewayError;
use crate::guardrails::{GuardrailsConfig, PerformanceTracker, SessionStore};
use crate::recorder::Writer;
use crate::trust::AuditChain;
use crate::vault;

/// Upstream calls get a generous but bounded deadline; LLM calls are slow.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared gateway state. Optional components are disabled when `None`;
/// the proxy must keep working without any of them.
pub struct Gateway {
    /// Upstream provider origin, no trailing slash.
    pub provider_url: String,
    /// Incoming auth key; `None` disables gateway authentication.
    pub gateway_key: Option<String>,
    pub upstream: reqwest::Client,
    pub vault: Option<Arc<vault::Client>>,
    pub recorder: Option<Arc<Writer>>,
    pub guardrails: Option<Arc<GuardrailsConfig>>,
    pub sessions: Option<Arc<SessionStore>>,
    pub chain: Option<Arc<AuditChain>>,
    pub analytics: Option<Arc<PerformanceTracker>>,
    /// Identifier stamped into evidence packages.
    pub gateway_id: String,
    /// HMAC key for evidence attestation.
    pub signing_key: String,
    /// Whether span trace ids are real; AIR records carry an empty
    /// trace_id otherwise.
    pub telemetry_enabled: bool,
}

impl Gateway {
    /// Build the HTTP router over this gateway.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/v1/chat/completions", post(handlers::chat_completions))
            .route("/v1/responses", post(handlers::responses))
            .route("/health", get(handlers::health))
            .route("/v1/audit", get(handlers::audit))
            .route("/v1/audit/export", get(handlers::audit_export))
            .with_state(self)
    }
}

/// The upstream HTTP client used for provider calls.
pub fn upstream_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()
        .expect("upstream client builds")
}

/// Check the gateway key if one is configured. `X-Api-Key` is accepted as
/// an alias for `X-Gateway-Key`.
pub fn authenticate_gateway(
    headers: &HeaderMap,
    gateway_key: Option<&str>,
) -> Result<(), GatewayError> {
    let Some(expected) = gateway_key else {
        return Ok(());
    };

    let provided = headers
        .get("x-gateway-key")
        .or_else(|| headers.get("x-api-key"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if provided != expected {
        return Err(GatewayError::Unauthorized);
    }
    Ok(())
}
