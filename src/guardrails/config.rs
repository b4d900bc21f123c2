//! Declarative guardrails policy document.
//!
//! Loaded from YAML at startup; absence of the file path disables the
//! whole guardrails subsystem. Unset values fall back to the documented
//! defaults after parse.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// All guardrail thresholds and policy settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuardrailsConfig {
    pub budgets: BudgetConfig,
    pub loop_detection: LoopConfig,
    pub tool_protection: ToolConfig,
    pub retry_protection: RetryConfig,
    pub alerts: AlertConfig,
    pub prevention: PreventionConfig,
    pub optimization: OptimizationConfig,
}

/// Token and cost limits per session. A zero `max_session_tokens`
/// disables the token budget rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_session_tokens: u64,
    pub max_session_cost_usd: f64,
}

/// Prompt loop detection thresholds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub similar_prompt_threshold: f64,
    pub max_similar_prompts: u32,
    pub window_seconds: u32,
}

/// Tool retry storm thresholds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub max_repeat_calls: u32,
    pub repeat_window_seconds: u32,
}

/// Error retry spiral threshold.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_consecutive_errors: u32,
}

/// Where violation alerts are sent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub webhook_url: String,
}

/// Policy enforcement settings. Prevention runs before detection and can
/// modify or block requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreventionConfig {
    pub tools: ToolFilterConfig,
    pub pii: PiiConfig,
    pub model_limits: ModelLimitConfig,
    pub approval: ApprovalConfig,
}

/// Which tools agents may use.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolFilterConfig {
    pub enabled: bool,
    /// If non-empty, only these tools are allowed.
    pub allowlist: Vec<String>,
    /// If the allowlist is empty, these tools are removed.
    pub blocklist: Vec<String>,
}

/// How PII hits in the last user message are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactMode {
    /// Reject the request with a policy error.
    Block,
    /// Replace hits with placeholders and forward.
    #[default]
    Redact,
}

/// PII detection settings, one switch per detector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    pub enabled: bool,
    pub block_ssn: bool,
    pub block_cc: bool,
    pub block_email: bool,
    pub block_phone: bool,
    pub redact_mode: RedactMode,
}

/// Cost-based model downgrading. The session token total stands in for
/// realized spend; the threshold is a token-count cut-over.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelLimitConfig {
    pub enabled: bool,
    pub cost_per_mtoken: HashMap<String, f64>,
    pub cost_threshold_usd: f64,
    pub downgrade_map: HashMap<String, String>,
}

/// Human-in-the-loop approval for detection violations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub timeout_seconds: u64,
    /// Rules that go through the approval flow; others block outright.
    pub rules: Vec<String>,
    /// Decision when the webhook times out or fails.
    pub fallback_allow: bool,
}

/// Performance analytics and model routing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub analytics: AnalyticsConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub enabled: bool,
    pub rules: Vec<RoutingRule>,
}

/// A condition under which a model is swapped before forwarding.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutingRule {
    pub from_model: String,
    pub to_model: String,
    /// "error_rate" or "latency_p95"
    pub condition: String,
    pub threshold: f64,
    pub enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("guardrails config: read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("guardrails config: parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Read a guardrails YAML document and apply defaults. Callers pass
/// `None` to run with guardrails disabled.
pub fn load(path: &Path) -> Result<GuardrailsConfig, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut cfg: GuardrailsConfig =
        serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    apply_defaults(&mut cfg);
    Ok(cfg)
}

fn apply_defaults(cfg: &mut GuardrailsConfig) {
    if cfg.loop_detection.similar_prompt_threshold == 0.0 {
        cfg.loop_detection.similar_prompt_threshold = 0.80;
    }
    if cfg.loop_detection.max_similar_prompts == 0 {
        cfg.loop_detection.max_similar_prompts = 5;
    }
    if cfg.loop_detection.window_seconds == 0 {
        cfg.loop_detection.window_seconds = 60;
    }
    if cfg.tool_protection.max_repeat_calls == 0 {
        cfg.tool_protection.max_repeat_calls = 3;
    }
    if cfg.tool_protection.repeat_window_seconds == 0 {
        cfg.tool_protection.repeat_window_seconds = 30;
    }
    if cfg.retry_protection.max_consecutive_errors == 0 {
        cfg.retry_protection.max_consecutive_errors = 3;
    }
    if cfg.prevention.approval.timeout_seconds == 0 {
        cfg.prevention.approval.timeout_seconds = 30;
    }
}
