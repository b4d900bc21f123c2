//! Human-in-the-loop approval for detection violations.
//!
//! When a rule is listed in the approval config, the violation is POSTed
//! to the webhook and the gateway waits for a decision within the
//! configured timeout. Webhook failures fall back to `fallback_allow`;
//! the approval path never errors out the request on its own.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::ApprovalConfig;
use super::detection::Violation;

/// Payload sent to the approval webhook.
#[derive(Debug, Serialize)]
pub struct ApprovalRequest<'a> {
    pub session_id: &'a str,
    pub violation_id: String,
    pub rule: &'a str,
    pub message: &'a str,
    pub details: &'a serde_json::Map<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Decision expected back from the webhook.
#[derive(Debug, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    #[serde(default)]
    pub reason: String,
}

/// Send a violation to the approval webhook and wait for a decision.
/// Returns whether the violation is overridden (approved).
///
/// - Approval disabled or no webhook configured: `false` — the violation
///   is enforced without consulting anyone.
/// - Rule not listed in `cfg.rules` (when non-empty): `false` — the
///   default block applies without consulting the webhook.
/// - Webhook unreachable, timed out, or unparseable: `cfg.fallback_allow`.
pub async fn request_approval(cfg: &ApprovalConfig, v: &Violation) -> bool {
    if !cfg.enabled || cfg.webhook_url.is_empty() {
        return false;
    }

    if !cfg.rules.is_empty() && !cfg.rules.iter().any(|r| r == v.rule.as_str()) {
        return false;
    }

    let now = Utc::now();
    let payload = ApprovalRequest {
        session_id: &v.session_id,
        violation_id: format!(
            "{}-{}",
            v.rule.as_str(),
            now.timestamp_nanos_opt().unwrap_or_default()
        ),
        rule: v.rule.as_str(),
        message: &v.message,
        details: &v.details,
        timestamp: now,
    };

    let timeout = Duration::from_secs(if cfg.timeout_seconds == 0 {
        30
    } else {
        cfg.timeout_seconds
    });

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, fallback = cfg.fallback_allow, "approval: client build failed");
            return cfg.fallback_allow;
        }
    };

    let resp = match client.post(&cfg.webhook_url).json(&payload).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, fallback = cfg.fallback_allow, "approval: webhook unreachable");
            return cfg.fallback_allow;
        }
    };

    let decision: ApprovalResponse = match resp.json().await {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, fallback = cfg.fallback_allow, "approval: undecodable response");
            return cfg.fallback_allow;
        }
    };

    if decision.approved {
        info!(
            session_id = %v.session_id,
            rule = %v.rule,
            reason = %decision.reason,
            "approval: approved"
        );
    } else {
        info!(
            session_id = %v.session_id,
            rule = %v.rule,
            reason = %decision.reason,
            "approval: denied"
        );
    }

    decision.approved
}
