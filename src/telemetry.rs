//! OpenTelemetry tracing for LLM calls.
//!
//! Export is enabled by the presence of `OTEL_EXPORTER_OTLP_ENDPOINT`;
//! without it a provider with no processors is installed and spans cost
//! nothing. Span attributes carry identifiers and counters only — never
//! prompt or response content.

use opentelemetry::global::{self, BoxedSpan};
use opentelemetry::trace::{Span, SpanKind, Status, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use thiserror::Error;

/// Span attribute names, following the OTel GenAI semantic conventions.
pub const GEN_AI_RUN_ID: &str = "gen_ai.run.id";
pub const GEN_AI_REQUEST_ENDPOINT: &str = "gen_ai.request.endpoint";
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
pub const GEN_AI_USAGE_PROMPT_TOKENS: &str = "gen_ai.usage.prompt_tokens";
pub const GEN_AI_USAGE_COMPLETION_TOKENS: &str = "gen_ai.usage.completion_tokens";
pub const GEN_AI_DURATION_MS: &str = "gen_ai.duration_ms";
pub const GEN_AI_STREAM: &str = "gen_ai.stream";

const TRACER_NAME: &str = "airgate";

/// Telemetry initialization settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP HTTP endpoint; `None` disables export entirely.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "airgate".to_string()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.otlp_endpoint.is_some()
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {reason}")]
    ExporterBuild { reason: String },

    #[error("tracer provider shutdown failed: {reason}")]
    Shutdown { reason: String },
}

/// Holds the tracer provider for the application lifetime. Call
/// [`TelemetryGuard::shutdown`] during graceful shutdown to flush spans.
pub struct TelemetryGuard {
    provider: SdkTracerProvider,
}

impl TelemetryGuard {
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        self.provider
            .shutdown()
            .map_err(|e| TelemetryError::Shutdown {
                reason: e.to_string(),
            })
    }
}

/// Install the global tracer provider. With an endpoint configured this
/// builds an OTLP HTTP/protobuf exporter behind a batch processor; without
/// one the provider has no processors and spans are never exported.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();

    let provider = if let Some(ref endpoint) = config.otlp_endpoint {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| TelemetryError::ExporterBuild {
                reason: e.to_string(),
            })?;

        let batch_processor = BatchSpanProcessor::builder(exporter).build();

        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_span_processor(batch_processor)
            .build()
    } else {
        SdkTracerProvider::builder().with_resource(resource).build()
    };

    global::set_tracer_provider(provider.clone());
    Ok(TelemetryGuard { provider })
}

/// Start the per-request `llm.call` span.
pub fn start_call_span(run_id: &str, endpoint: &str) -> BoxedSpan {
    let tracer = global::tracer(TRACER_NAME);
    tracer
        .span_builder("llm.call")
        .with_kind(SpanKind::Client)
        .with_attributes([
            KeyValue::new(GEN_AI_RUN_ID, run_id.to_string()),
            KeyValue::new(GEN_AI_REQUEST_ENDPOINT, endpoint.to_string()),
        ])
        .start(&tracer)
}

/// Hex trace id of a span, empty when the span context is invalid.
pub fn trace_id_hex(span: &BoxedSpan) -> String {
    let ctx = span.span_context();
    if !ctx.is_valid() {
        return String::new();
    }
    hex::encode(ctx.trace_id().to_bytes())
}

/// Record the call outcome on the span and close it.
pub fn finish_call_span(span: &mut BoxedSpan, duration_ms: u64, is_error: bool, detail: &str) {
    span.set_attribute(KeyValue::new(GEN_AI_DURATION_MS, duration_ms as i64));
    if is_error {
        span.set_status(Status::error(detail.to_string()));
    } else {
        span.set_status(Status::Ok);
    }
    span.end();
}
