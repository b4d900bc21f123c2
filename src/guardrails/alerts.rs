//! Webhook alerts for guardrail violations.
//!
//! Delivery is fully asynchronous relative to the request path: the alert
//! is posted from a spawned task with a bounded timeout, and failures are
//! logged, never returned.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use super::detection::Violation;

#[derive(Serialize)]
struct AlertMessage {
    text: String,
}

/// Post a narrative alert for a violation. Returns immediately; the HTTP
/// call happens in its own task.
pub fn send_webhook_alert(webhook_url: &str, v: &Violation) {
    if webhook_url.is_empty() {
        return;
    }

    let url = webhook_url.to_string();
    let text = build_narrative(v);

    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "alert: client build failed");
                return;
            }
        };

        match client.post(&url).json(&AlertMessage { text }).send().await {
            Ok(resp) if resp.status().as_u16() >= 300 => {
                warn!(status = resp.status().as_u16(), "alert: webhook returned error status");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "alert: send failed");
            }
        }
    });
}

/// A human-readable incident report for one violation.
pub fn build_narrative(v: &Violation) -> String {
    let mut msg = String::new();

    msg.push_str("🚨 *AI AGENT GUARDRAIL TRIGGERED*\n\n");
    msg.push_str(&format!("*Rule:* {}\n", v.rule.display_name()));
    msg.push_str(&format!("*Session:* {}\n", v.session_id));
    msg.push_str(&format!("*Time:* {}\n\n", Utc::now().to_rfc3339()));

    msg.push_str("*What happened:*\n");
    msg.push_str(&v.message);
    msg.push_str("\n\n");

    if !v.details.is_empty() {
        msg.push_str("*Details:*\n");
        for (key, value) in &v.details {
            msg.push_str(&format!("• {key}: {value}\n"));
        }
        msg.push('\n');
    }

    msg.push_str("*Action taken:*\n");
    msg.push_str("✔ Request blocked\n");
    msg.push_str("✔ Session flagged\n\n");

    msg.push_str("*Recommended:* Review the agent's error handling and prompt logic.");

    msg
}
