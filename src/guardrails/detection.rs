//! Detection rules for runaway agents.
//!
//! Evaluation order is fixed: token budget, prompt loop, tool retry storm,
//! error spiral. The first violation short-circuits. Rules are pure over a
//! deep-copied session snapshot; nothing here mutates the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::config::GuardrailsConfig;
use super::session::{PromptEntry, SessionState, SessionStore};
use super::similarity::jaccard;

/// Detection rule identifiers. `Prevention` is used only when alerting on
/// prevention-layer blocks; it is never produced by `evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    TokenBudget,
    PromptLoop,
    ToolRetryStorm,
    ErrorSpiral,
    Prevention,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::TokenBudget => "token_budget",
            Rule::PromptLoop => "prompt_loop",
            Rule::ToolRetryStorm => "tool_retry_storm",
            Rule::ErrorSpiral => "error_spiral",
            Rule::Prevention => "prevention",
        }
    }

    /// Human-friendly name for alert narratives.
    pub fn display_name(self) -> &'static str {
        match self {
            Rule::TokenBudget => "Token Budget Exceeded",
            Rule::PromptLoop => "Prompt Loop Detection",
            Rule::ToolRetryStorm => "Tool Retry Storm",
            Rule::ErrorSpiral => "Error Retry Spiral",
            Rule::Prevention => "Prevention Policy",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guardrail that was triggered.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
    pub session_id: String,
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Parsed request data needed for detection.
#[derive(Debug, Default)]
pub struct EvalRequest<'a> {
    /// The last user message content.
    pub prompt_text: &'a str,
    /// Tool/function names named in the request.
    pub tool_names: &'a [String],
}

/// Run all detection rules against the current session state. Returns the
/// first violation, or `None` when everything is normal. Unknown sessions
/// never violate (call `get_or_create` first).
pub fn evaluate(
    cfg: &GuardrailsConfig,
    store: &SessionStore,
    session_id: &str,
    req: &EvalRequest<'_>,
) -> Option<Violation> {
    let snapshot = store.snapshot(session_id)?;
    evaluate_snapshot(cfg, &snapshot, req, Utc::now())
}

/// Rule evaluation over a snapshot at a fixed instant. Split out so tests
/// control the clock.
pub fn evaluate_snapshot(
    cfg: &GuardrailsConfig,
    snapshot: &SessionState,
    req: &EvalRequest<'_>,
    now: DateTime<Utc>,
) -> Option<Violation> {
    check_token_budget(cfg, snapshot)
        .or_else(|| check_prompt_loop(cfg, snapshot, req.prompt_text, now))
        .or_else(|| check_tool_retry_storm(cfg, snapshot, req.tool_names, now))
        .or_else(|| check_error_spiral(cfg, snapshot))
}

fn check_token_budget(cfg: &GuardrailsConfig, s: &SessionState) -> Option<Violation> {
    let max = cfg.budgets.max_session_tokens;
    if max == 0 || s.total_tokens < max {
        return None;
    }

    Some(Violation {
        rule: Rule::TokenBudget,
        message: format!(
            "Session halted: token budget exceeded ({} / {} tokens).",
            s.total_tokens, max
        ),
        session_id: s.session_id.clone(),
        details: details(json!({
            "total_tokens": s.total_tokens,
            "max_tokens": max,
        })),
    })
}

fn check_prompt_loop(
    cfg: &GuardrailsConfig,
    s: &SessionState,
    current_prompt: &str,
    now: DateTime<Utc>,
) -> Option<Violation> {
    let threshold = cfg.loop_detection.similar_prompt_threshold;
    let max_similar = cfg.loop_detection.max_similar_prompts;
    let window = cfg.loop_detection.window_seconds;

    if threshold <= 0.0 || max_similar == 0 || current_prompt.is_empty() {
        return None;
    }

    let cutoff = now - chrono::Duration::seconds(i64::from(window));
    let mut matches = 0u32;
    let mut highest: f64 = 0.0;

    for PromptEntry { text, timestamp } in &s.prompt_history {
        if *timestamp < cutoff {
            continue;
        }
        let score = jaccard(current_prompt, text);
        if score >= threshold {
            matches += 1;
        }
        highest = highest.max(score);
    }

    if matches < max_similar {
        return None;
    }

    Some(Violation {
        rule: Rule::PromptLoop,
        message: format!(
            "Session halted: agent appears stuck in a recursive loop. Last {} prompts were >{:.0}% identical.",
            matches,
            threshold * 100.0
        ),
        session_id: s.session_id.clone(),
        details: details(json!({
            "similar_prompts": matches,
            "similarity_score": highest,
            "threshold": threshold,
        })),
    })
}

fn check_tool_retry_storm(
    cfg: &GuardrailsConfig,
    s: &SessionState,
    current_tools: &[String],
    now: DateTime<Utc>,
) -> Option<Violation> {
    let max_calls = cfg.tool_protection.max_repeat_calls;
    let window = cfg.tool_protection.repeat_window_seconds;

    if max_calls == 0 || window == 0 {
        return None;
    }

    let cutoff = now - chrono::Duration::seconds(i64::from(window));

    for tool in current_tools {
        let Some(timestamps) = s.tool_calls.get(tool) else {
            continue;
        };

        let recent = timestamps.iter().filter(|ts| **ts > cutoff).count() as u32;
        if recent >= max_calls {
            return Some(Violation {
                rule: Rule::ToolRetryStorm,
                message: format!(
                    "Session halted: tool '{tool}' called {recent} times in {window} seconds."
                ),
                session_id: s.session_id.clone(),
                details: details(json!({
                    "tool_name": tool,
                    "call_count": recent,
                    "window_seconds": window,
                })),
            });
        }
    }

    None
}

fn check_error_spiral(cfg: &GuardrailsConfig, s: &SessionState) -> Option<Violation> {
    let max_errors = cfg.retry_protection.max_consecutive_errors;
    if max_errors == 0 || s.consecutive_errors < max_errors {
        return None;
    }

    Some(Violation {
        rule: Rule::ErrorSpiral,
        message: format!(
            "Session halted: {} consecutive errors detected. Agent may be stuck in a retry loop.",
            s.consecutive_errors
        ),
        session_id: s.session_id.clone(),
        details: details(json!({
            "consecutive_errors": s.consecutive_errors,
            "max_errors": max_errors,
        })),
    })
}

fn details(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
