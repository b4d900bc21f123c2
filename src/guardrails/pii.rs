//! PII scanning and redaction for prompt text.

use std::sync::LazyLock;

use regex::Regex;

use super::config::{PiiConfig, RedactMode};

// SSN: XXX-XX-XXXX
static SSN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

// Credit card: 13-19 digits with optional spaces/dashes (Visa, MC, Amex, Discover)
static CC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]*?){13,19}\b").unwrap());

// Email: standard pattern
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}\b").unwrap()
});

// US phone: (XXX) XXX-XXXX, XXX-XXX-XXXX, XXX.XXX.XXXX
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\(\d{3}\)\s?|\d{3}[-.])\d{3}[-.]?\d{4}\b").unwrap()
});

/// Outcome of scanning one text for PII.
#[derive(Debug, PartialEq, Eq)]
pub enum PiiOutcome {
    /// No enabled detector matched; text unchanged.
    Clean,
    /// PII found and the policy is `block`: reject the request.
    Blocked,
    /// PII found and the policy is `redact`: forward the replacement text.
    Redacted(String),
}

/// Scan text for personally identifiable information. Detectors run in a
/// fixed order (SSN, credit card, email, phone), each individually
/// enabled, replacing hits with placeholders as they go.
pub fn check_pii(cfg: &PiiConfig, text: &str) -> PiiOutcome {
    if !cfg.enabled || text.is_empty() {
        return PiiOutcome::Clean;
    }

    let mut found = false;
    let mut redacted = text.to_string();

    if cfg.block_ssn && SSN_RE.is_match(&redacted) {
        found = true;
        redacted = SSN_RE.replace_all(&redacted, "[SSN]").into_owned();
    }

    if cfg.block_cc && CC_RE.is_match(&redacted) {
        found = true;
        redacted = CC_RE.replace_all(&redacted, "[CC]").into_owned();
    }

    if cfg.block_email && EMAIL_RE.is_match(&redacted) {
        found = true;
        redacted = EMAIL_RE.replace_all(&redacted, "[EMAIL]").into_owned();
    }

    if cfg.block_phone && PHONE_RE.is_match(&redacted) {
        found = true;
        redacted = PHONE_RE.replace_all(&redacted, "[PHONE]").into_owned();
    }

    if !found {
        return PiiOutcome::Clean;
    }

    match cfg.redact_mode {
        RedactMode::Block => PiiOutcome::Blocked,
        RedactMode::Redact => PiiOutcome::Redacted(redacted),
    }
}
