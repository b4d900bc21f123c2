//! Failure taxonomy for upstream LLM provider errors.

use serde::Serialize;

/// Closed set of failure categories. Classification is total and
/// deterministic over (status code, body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimit,
    ContextLength,
    InvalidRequest,
    ServerError,
    Timeout,
    ContentFilter,
    AuthError,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::RateLimit => "rate_limit",
            FailureKind::ContextLength => "context_length",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::ServerError => "server_error",
            FailureKind::Timeout => "timeout",
            FailureKind::ContentFilter => "content_filter",
            FailureKind::AuthError => "auth_error",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an HTTP status code and error body to a failure category.
/// Unambiguous status codes win; ambiguous 400s fall back to
/// case-insensitive substring matching on the body.
pub fn classify_failure(status_code: u16, error_body: &str) -> FailureKind {
    let lower = error_body.to_lowercase();

    match status_code {
        429 => return FailureKind::RateLimit,
        401 | 403 => return FailureKind::AuthError,
        500 | 502 | 503 => return FailureKind::ServerError,
        504 => return FailureKind::Timeout,
        _ => {}
    }

    // Timeouts show up in bodies regardless of status code.
    if contains_any(&lower, &["timeout", "deadline exceeded", "context deadline"]) {
        return FailureKind::Timeout;
    }

    if status_code == 400 {
        if contains_any(
            &lower,
            &[
                "context_length",
                "context length",
                "max_tokens",
                "maximum context",
                "token limit",
            ],
        ) {
            return FailureKind::ContextLength;
        }
        if contains_any(
            &lower,
            &[
                "content_policy",
                "content policy",
                "content filter",
                "filtered",
                "violates",
                "safety",
            ],
        ) {
            return FailureKind::ContentFilter;
        }
        return FailureKind::InvalidRequest;
    }

    if (400..500).contains(&status_code) {
        return FailureKind::InvalidRequest;
    }

    FailureKind::Unknown
}

fn contains_any(s: &str, substrings: &[&str]) -> bool {
    substrings.iter().any(|sub| s.contains(sub))
}
