//! Replay engine: reconstruct a recorded run from the vault, reissue it
//! against the provider, and report behavioral drift.
//!
//! Checksum mismatches are fatal and treated as tamper evidence — the
//! stricter taxonomy here is deliberate.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::guardrails::similarity::jaccard;
use crate::recorder::Record;
use crate::vault::{self, Client as VaultClient};

/// Similarity below this threshold counts as drift.
pub const DRIFT_THRESHOLD: f64 = 0.80;

/// Outcome of replaying one AIR record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplayResult {
    pub run_id: String,
    pub original_model: String,
    pub replay_model: String,
    pub drift: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub drift_summary: String,
    pub original_tokens: u64,
    pub replay_tokens: u64,
    /// 0.0–1.0 word-overlap similarity.
    pub similarity: f64,
}

/// Replay configuration.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Upstream provider origin for the reissue.
    pub provider_url: String,
    /// Provider API key, sent as a bearer token.
    pub api_key: String,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay: no request vault ref in AIR record")]
    MissingRequestRef,

    /// The vaulted bytes no longer match the recorded checksum.
    #[error("replay: {what} checksum mismatch (tampered?)")]
    ChecksumMismatch { what: &'static str },

    #[error(transparent)]
    Vault(#[from] vault::VaultError),

    #[error("replay: upstream: {0}")]
    Upstream(String),
}

/// Fetch the original request and response from the vault, verify their
/// checksums, reissue the request, and compare assistant content.
pub async fn run(
    record: &Record,
    vault_client: &VaultClient,
    opts: &ReplayOptions,
) -> Result<ReplayResult, ReplayError> {
    let mut result = ReplayResult {
        run_id: record.run_id.clone(),
        original_model: record.model.clone(),
        replay_model: String::new(),
        drift: false,
        drift_summary: String::new(),
        original_tokens: record.tokens.total,
        replay_tokens: 0,
        similarity: 0.0,
    };

    let request_key =
        extract_key(&record.request_vault_ref).ok_or(ReplayError::MissingRequestRef)?;
    let request_data = vault_client.fetch(&request_key).await?;
    if !record.request_checksum.is_empty()
        && !vault::verify_checksum(&request_data, &record.request_checksum)
    {
        return Err(ReplayError::ChecksumMismatch { what: "request" });
    }

    let original_response = match extract_key(&record.response_vault_ref) {
        Some(response_key) => {
            let data = vault_client.fetch(&response_key).await?;
            if !record.response_checksum.is_empty()
                && !vault::verify_checksum(&data, &record.response_checksum)
            {
                return Err(ReplayError::ChecksumMismatch { what: "response" });
            }
            data
        }
        None => Default::default(),
    };

    // Reissue the original request bytes against the provider.
    let provider_url = if opts.provider_url.is_empty() {
        "https://api.openai.com"
    } else {
        opts.provider_url.trim_end_matches('/')
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| ReplayError::Upstream(e.to_string()))?;

    let mut request = client
        .post(format!("{provider_url}{}", record.endpoint))
        .header("content-type", "application/json")
        .body(request_data.to_vec());
    if !opts.api_key.is_empty() {
        request = request.header("authorization", format!("Bearer {}", opts.api_key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| ReplayError::Upstream(e.to_string()))?;
    let replay_body = response
        .bytes()
        .await
        .map_err(|e| ReplayError::Upstream(e.to_string()))?;

    if let Ok(parsed) = serde_json::from_slice::<Value>(&replay_body) {
        if let Some(model) = parsed.get("model").and_then(Value::as_str) {
            result.replay_model = model.to_string();
        }
        if let Some(total) = parsed
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(Value::as_u64)
        {
            result.replay_tokens = total;
        }
    }

    let original_content = extract_content(&original_response);
    let replay_content = extract_content(&replay_body);

    result.similarity = jaccard(&original_content, &replay_content);
    result.drift = result.similarity < DRIFT_THRESHOLD;

    if result.drift {
        result.drift_summary = format!(
            "similarity={:.2} (threshold={DRIFT_THRESHOLD:.2}); original={} chars, replay={} chars",
            result.similarity,
            original_content.len(),
            replay_content.len()
        );
    }

    Ok(result)
}

/// `vault://bucket/run_id/file.json` → `run_id/file.json`
pub fn extract_key(uri: &str) -> Option<String> {
    if uri.is_empty() {
        return None;
    }
    let (_, bucket_and_key) = uri.split_once("//")?;
    let (_, key) = bucket_and_key.split_once('/')?;
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

/// The assistant message content of an OpenAI-shape response, falling
/// back to the raw text.
pub fn extract_content(data: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<Value>(data) {
        if let Some(content) = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
        {
            return content.to_string();
        }
    }
    String::from_utf8_lossy(data).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_extraction() {
        assert_eq!(
            extract_key("vault://air-runs/run-1/request.json").as_deref(),
            Some("run-1/request.json")
        );
        assert_eq!(extract_key(""), None);
        assert_eq!(extract_key("not-a-uri"), None);
        assert_eq!(extract_key("vault://bucket-only"), None);
    }

    #[test]
    fn content_from_openai_shape() {
        let body = serde_json::to_vec(&serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Paris."}}]
        }))
        .unwrap();
        assert_eq!(extract_content(&body), "Paris.");
    }

    #[test]
    fn content_falls_back_to_raw_text() {
        assert_eq!(extract_content(b"plain text body"), "plain text body");
        assert_eq!(extract_content(br#"{"unexpected":"shape"}"#), r#"{"unexpected":"shape"}"#);
    }

    #[test]
    fn drift_threshold_boundary() {
        // Identical content: similarity 1.0, no drift.
        let a = "a flight recorder captures data";
        assert!(jaccard(a, a) >= DRIFT_THRESHOLD);
        // Disjoint content: similarity 0.0, drift.
        assert!(jaccard(a, "completely different words entirely") < DRIFT_THRESHOLD);
    }
}
