//! Background recording: vault puts, AIR record write, chain append,
//! analytics update.
//!
//! Runs as a detached task that outlives the response, bounded by its own
//! deadline. The task owns copies of all request-scoped data; every
//! failure here is logged with the run id and never reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::guardrails::failures::classify_failure;
use crate::recorder::{Record, RunStatus};
use crate::vault::VaultRef;

use super::extract::{extract_stream_tokens, parse_usage};
use super::Gateway;

/// Deadline for the whole recording pipeline of one call.
const RECORD_DEADLINE: Duration = Duration::from_secs(10);

/// Everything the recording task needs, copied out of the request scope.
#[derive(Debug)]
pub struct RecordContext {
    pub run_id: String,
    pub trace_id: String,
    pub model: String,
    pub provider: &'static str,
    pub endpoint: &'static str,
    pub request_body: Bytes,
    pub response_body: Option<Bytes>,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Upstream HTTP status, absent on transport failure.
    pub http_status: Option<u16>,
    pub error: String,
}

/// Schedule the recording pipeline. Fire-and-forget: the server never
/// joins this task.
pub fn spawn_background_record(gateway: Arc<Gateway>, ctx: RecordContext) {
    tokio::spawn(async move {
        if tokio::time::timeout(RECORD_DEADLINE, run(gateway, ctx))
            .await
            .is_err()
        {
            warn!("background record: deadline exceeded");
        }
    });
}

async fn run(gateway: Arc<Gateway>, ctx: RecordContext) {
    // Vault the request and response, each best-effort.
    let request_ref = vault_store(
        &gateway,
        &ctx.run_id,
        "request.json",
        Some(ctx.request_body.as_ref()),
    )
    .await;
    let response_ref = vault_store(
        &gateway,
        &ctx.run_id,
        "response.json",
        ctx.response_body.as_deref(),
    )
    .await;

    // Token usage from the response, trying the buffered shape first and
    // the SSE stream shape second.
    let tokens = ctx
        .response_body
        .as_deref()
        .map(|body| parse_usage(body).unwrap_or_else(|| extract_stream_tokens(body)))
        .unwrap_or_default();

    let duration_ms = (Utc::now() - ctx.started_at).num_milliseconds().max(0) as u64;

    let record = Record {
        version: String::new(),
        run_id: ctx.run_id.clone(),
        trace_id: ctx.trace_id.clone(),
        timestamp: ctx.started_at,
        model: ctx.model.clone(),
        provider: ctx.provider.to_string(),
        endpoint: ctx.endpoint.to_string(),
        request_vault_ref: request_ref.uri.clone(),
        response_vault_ref: response_ref.uri.clone(),
        request_checksum: request_ref.checksum.clone(),
        response_checksum: response_ref.checksum.clone(),
        tokens,
        duration_ms,
        status: ctx.status,
        error: ctx.error.clone(),
    };

    // AIR record file, best-effort.
    if let Some(recorder) = &gateway.recorder {
        if let Err(e) = recorder.write(record.clone()) {
            warn!(run_id = %ctx.run_id, error = %e, "write AIR record");
        }
    }

    // Audit chain link over the canonical record JSON.
    if let Some(chain) = &gateway.chain {
        match serde_json::to_vec(&record) {
            Ok(record_json) => {
                chain.append(&ctx.run_id, &record_json);
            }
            Err(e) => warn!(run_id = %ctx.run_id, error = %e, "serialize record for chain"),
        }
    }

    // Analytics aggregation.
    if let Some(analytics) = &gateway.analytics {
        let error_type = if ctx.status.is_error() {
            let body_text = ctx
                .response_body
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|| ctx.error.clone());
            Some(classify_failure(ctx.http_status.unwrap_or(0), &body_text))
        } else {
            None
        };

        analytics.record_call(
            &ctx.model,
            duration_ms,
            tokens.prompt,
            tokens.completion,
            tokens.total,
            !ctx.status.is_error(),
            error_type,
        );
    }
}

/// Best-effort vault put; a missing vault or `None` body yields the empty
/// reference, which downstream treats as "vault disabled".
async fn vault_store(
    gateway: &Gateway,
    run_id: &str,
    name: &str,
    data: Option<&[u8]>,
) -> VaultRef {
    let (Some(vault), Some(data)) = (&gateway.vault, data) else {
        return VaultRef::default();
    };

    let key = format!("{run_id}/{name}");
    match vault.store(&key, data).await {
        Ok(reference) => reference,
        Err(e) => {
            warn!(run_id, error = %e, "vault {name} (background)");
            VaultRef::default()
        }
    }
}
