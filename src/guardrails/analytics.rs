//! In-memory per-model performance analytics.
//!
//! A reader-writer lock guards the model map; writers update aggregates,
//! readers compute quantiles on copies. Stats reset on gateway restart.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::failures::FailureKind;

/// Latency samples are bounded; once full, new samples overwrite the
/// `(request_count mod 10_000)`-th slot.
const LATENCY_CAP: usize = 10_000;

/// Computed latency percentiles for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Aggregated performance metrics for one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub model: String,
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_tokens: u64,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    #[serde(skip)]
    pub latencies: Vec<u64>,
    pub errors_by_type: HashMap<String, u64>,
    pub last_updated: DateTime<Utc>,
}

impl ModelStats {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_tokens: 0,
            tokens_prompt: 0,
            tokens_completion: 0,
            latencies: Vec::new(),
            errors_by_type: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Latency percentiles computed on a sorted copy of the samples.
    pub fn compute_latency(&self) -> LatencyStats {
        if self.latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();

        let n = sorted.len();
        let sum: u64 = sorted.iter().sum();

        LatencyStats {
            avg_ms: sum / n as u64,
            p50_ms: sorted[n / 2],
            p95_ms: sorted[percentile_index(n, 95)],
            p99_ms: sorted[percentile_index(n, 99)],
        }
    }

    /// Error rate between 0.0 and 1.0; 0 with no data.
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.request_count as f64
    }
}

fn percentile_index(n: usize, pct: usize) -> usize {
    ((n * pct) / 100).min(n - 1)
}

/// Thread-safe per-model aggregation.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    models: RwLock<HashMap<String, ModelStats>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed LLM call. `error_type` is the failure
    /// classification, `None` for successful calls.
    pub fn record_call(
        &self,
        model: &str,
        duration_ms: u64,
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        success: bool,
        error_type: Option<FailureKind>,
    ) {
        let mut models = self.models.write().unwrap();
        let stats = models
            .entry(model.to_string())
            .or_insert_with(|| ModelStats::new(model));

        stats.request_count += 1;
        stats.total_tokens += total_tokens;
        stats.tokens_prompt += prompt_tokens;
        stats.tokens_completion += completion_tokens;
        stats.last_updated = Utc::now();

        if stats.latencies.len() < LATENCY_CAP {
            stats.latencies.push(duration_ms);
        } else {
            let slot = (stats.request_count % LATENCY_CAP as u64) as usize;
            stats.latencies[slot] = duration_ms;
        }

        if success {
            stats.success_count += 1;
        } else {
            stats.error_count += 1;
            if let Some(kind) = error_type {
                *stats
                    .errors_by_type
                    .entry(kind.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// A copy of one model's stats, `None` if it has no recorded calls.
    pub fn model_stats(&self, model: &str) -> Option<ModelStats> {
        let models = self.models.read().unwrap();
        models.get(model).cloned()
    }

    /// Copies of all tracked models' stats.
    pub fn all_stats(&self) -> Vec<ModelStats> {
        let models = self.models.read().unwrap();
        models.values().cloned().collect()
    }

    /// Error rate for a model, 0.0 with no data.
    pub fn error_rate(&self, model: &str) -> f64 {
        let models = self.models.read().unwrap();
        models.get(model).map_or(0.0, ModelStats::error_rate)
    }

    /// P95 latency in milliseconds for a model, 0 with no data.
    pub fn latency_p95(&self, model: &str) -> u64 {
        let models = self.models.read().unwrap();
        models
            .get(model)
            .map_or(0, |stats| stats.compute_latency().p95_ms)
    }
}
