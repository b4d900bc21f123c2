//! Signed evidence packages for regulator export.
//!
//! The package bundles the audit chain, its verification result, and the
//! compliance report, then signs its own JSON serialization (with the
//! attestation field cleared) so any later mutation is detectable.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::chain::{AuditChain, ChainEntry};
use super::compliance::ComplianceReport;

type HmacSha256 = Hmac<Sha256>;

/// Earliest and latest timestamps in the audit chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Exportable bundle of everything an auditor needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub exported_at: DateTime<Utc>,
    pub gateway_id: String,
    pub chain_length: u64,
    pub chain_valid: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub chain_broken_at: u64,
    pub audit_entries: Vec<ChainEntry>,
    pub compliance_report: ComplianceReport,
    pub record_count: u64,
    pub time_range: TimeRange,
    /// HMAC-SHA256 of the package JSON with this field cleared.
    pub attestation: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Build and sign an evidence package from the current chain state.
pub fn generate_evidence_package(
    chain: &AuditChain,
    compliance: ComplianceReport,
    gateway_id: &str,
    secret: &str,
) -> EvidencePackage {
    let entries = chain.entries();
    let chain_len = chain.len();
    let verification = chain.verify();

    let time_range = TimeRange {
        earliest: entries.first().map(|e| e.timestamp),
        latest: entries.last().map(|e| e.timestamp),
    };

    let mut pkg = EvidencePackage {
        exported_at: Utc::now(),
        gateway_id: gateway_id.to_string(),
        chain_length: chain_len,
        chain_valid: verification.valid,
        chain_broken_at: verification.broken_at,
        audit_entries: entries,
        compliance_report: compliance,
        record_count: chain_len,
        time_range,
        attestation: String::new(),
    };

    pkg.attestation = sign_package(&pkg, secret);
    pkg
}

/// Check an evidence package's attestation against its contents. True iff
/// the package is byte-identical to what was signed.
pub fn verify_attestation(pkg: &EvidencePackage, secret: &str) -> bool {
    let mut unsigned = pkg.clone();
    unsigned.attestation = String::new();
    sign_package(&unsigned, secret) == pkg.attestation
}

/// HMAC-SHA256 of the JSON-serialized package. The attestation field must
/// already be cleared.
fn sign_package(pkg: &EvidencePackage, secret: &str) -> String {
    let data = serde_json::to_vec(pkg).expect("evidence package serializes");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&data);
    hex::encode(mac.finalize().into_bytes())
}
