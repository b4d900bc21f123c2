//! Prevention policies: PII handling, tool filtering, model downgrade.
//!
//! Runs before detection on each request. Policies run in order and
//! modifications accumulate into a single body rewrite; a failed rewrite
//! forwards the original body rather than failing the call.

use serde_json::{Map, Value};
use tracing::warn;

use super::config::GuardrailsConfig;
use super::downgrade::downgrade_model;
use super::pii::{check_pii, PiiOutcome};
use super::toolfilter::filter_tools;

/// What happened when prevention evaluated a request.
#[derive(Debug, Default)]
pub struct PreventionResult {
    /// The request should be rejected entirely.
    pub blocked: bool,
    pub block_reason: String,

    /// The rewritten JSON body to send upstream. `None` means forward the
    /// original unchanged.
    pub modified_body: Option<Vec<u8>>,

    /// Original model name when a downgrade was applied.
    pub model_downgraded: Option<String>,
    pub pii_redacted: bool,
    pub tools_filtered: bool,
}

/// Run all prevention policies against a request. Order: PII → tools →
/// model downgrade. The first blocking policy returns immediately.
pub fn evaluate(
    cfg: &GuardrailsConfig,
    req_body: &[u8],
    prompt_text: &str,
    tool_names: &[String],
    model: &str,
    session_tokens: u64,
) -> PreventionResult {
    let mut result = PreventionResult::default();
    let prev = &cfg.prevention;

    let mut needs_rewrite = false;
    let mut new_prompt = prompt_text.to_string();
    let mut new_tools: Option<Vec<String>> = None;
    let mut new_model: Option<String> = None;

    // Rule 1: PII blocking/redaction.
    if prev.pii.enabled {
        match check_pii(&prev.pii, prompt_text) {
            PiiOutcome::Blocked => {
                result.blocked = true;
                result.block_reason = "PII detected in request (policy: block)".to_string();
                return result;
            }
            PiiOutcome::Redacted(redacted) => {
                new_prompt = redacted;
                result.pii_redacted = true;
                needs_rewrite = true;
                warn!("prevention: PII redacted from prompt");
            }
            PiiOutcome::Clean => {}
        }
    }

    // Rule 2: tool filtering.
    if prev.tools.enabled && !tool_names.is_empty() {
        let filtered = filter_tools(&prev.tools, tool_names);
        if filtered.is_empty() {
            result.blocked = true;
            result.block_reason = "all requested tools are blocked by policy".to_string();
            return result;
        }
        if filtered.len() != tool_names.len() {
            warn!(
                requested = tool_names.len(),
                kept = filtered.len(),
                "prevention: tools filtered"
            );
            new_tools = Some(filtered);
            result.tools_filtered = true;
            needs_rewrite = true;
        }
    }

    // Rule 3: model downgrade.
    if prev.model_limits.enabled {
        if let Some(downgraded) = downgrade_model(&prev.model_limits, model, session_tokens) {
            warn!(from = model, to = %downgraded, "prevention: model downgrade");
            result.model_downgraded = Some(model.to_string());
            new_model = Some(downgraded);
            needs_rewrite = true;
        }
    }

    if needs_rewrite {
        match rewrite_body(
            req_body,
            prompt_text,
            &new_prompt,
            new_tools.as_deref(),
            new_model.as_deref(),
        ) {
            Ok(modified) => result.modified_body = Some(modified),
            Err(e) => {
                // Forward the original body rather than turning policy
                // enforcement into a 5xx.
                warn!(error = %e, "prevention: failed to rewrite request body");
            }
        }
    }

    result
}

/// Apply accumulated modifications to the raw JSON request, preserving
/// every field the gateway does not understand.
fn rewrite_body(
    body: &[u8],
    original_prompt: &str,
    new_prompt: &str,
    new_tools: Option<&[String]>,
    new_model: Option<&str>,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut req: Map<String, Value> = serde_json::from_slice(body)?;

    if let Some(model) = new_model {
        req.insert("model".to_string(), Value::String(model.to_string()));
    }

    if new_prompt != original_prompt {
        if let Some(messages) = req.get_mut("messages") {
            redact_messages(messages, original_prompt, new_prompt);
        }
    }

    if let Some(allowed) = new_tools {
        if let Some(tools) = req.get_mut("tools") {
            *tools = filter_tools_json(tools, allowed);
        }
    }

    serde_json::to_vec(&req)
}

/// Replace the original prompt with the redacted text in every user
/// message whose content matches it exactly, for both string content and
/// array-of-parts content.
fn redact_messages(messages: &mut Value, original: &str, redacted: &str) {
    let Some(list) = messages.as_array_mut() else {
        return;
    };

    for msg in list {
        if msg.get("role").and_then(Value::as_str) != Some("user") {
            continue;
        }
        let Some(content) = msg.get_mut("content") else {
            continue;
        };

        match content {
            Value::String(text) if text == original => {
                *content = Value::String(redacted.to_string());
            }
            Value::Array(parts) => {
                for part in parts {
                    if part.get("type").and_then(Value::as_str) != Some("text") {
                        continue;
                    }
                    if part.get("text").and_then(Value::as_str) == Some(original) {
                        part["text"] = Value::String(redacted.to_string());
                    }
                }
            }
            _ => {}
        }
    }
}

/// Keep only tool objects whose `function.name` is in the allowed list.
fn filter_tools_json(tools: &Value, allowed: &[String]) -> Value {
    let Some(list) = tools.as_array() else {
        return tools.clone();
    };

    let kept: Vec<Value> = list
        .iter()
        .filter(|tool| {
            tool.get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .is_some_and(|name| allowed.iter().any(|a| a == name))
        })
        .cloned()
        .collect();

    Value::Array(kept)
}
