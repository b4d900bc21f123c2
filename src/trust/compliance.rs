//! Compliance control evaluation.
//!
//! Maps gateway capabilities onto SOC 2 Trust Service Criteria and
//! ISO 27001 Annex A controls. Each control's status is a pure function of
//! `(chain_len, has_vault, has_guardrails, has_analytics)` — the tables
//! are fixed enumerations, not a plugin lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a compliance control is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Pass,
    Fail,
    Partial,
}

/// Supported compliance frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framework {
    #[serde(rename = "SOC2")]
    Soc2,
    #[serde(rename = "ISO27001")]
    Iso27001,
}

impl Framework {
    pub fn as_str(self) -> &'static str {
        match self {
            Framework::Soc2 => "SOC2",
            Framework::Iso27001 => "ISO27001",
        }
    }
}

/// A single compliance control mapped to a gateway capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    /// e.g. "CC6.1" or "A.12.4.1"
    pub id: String,
    pub framework: Framework,
    pub name: String,
    pub description: String,
    pub status: ControlStatus,
    /// How the gateway satisfies (or fails) this control.
    pub evidence: String,
    /// Which layer provides it.
    pub gateway_feature: String,
}

/// Aggregate pass/fail counts for a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_controls: usize,
    pub passing: usize,
    pub failing: usize,
    pub partial: usize,
    pub pass_rate: f64,
}

/// The result of evaluating the gateway against one or more frameworks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub gateway_version: String,
    pub frameworks: Vec<Framework>,
    pub controls: Vec<Control>,
    pub summary: Summary,
}

/// Evaluate the configured frameworks against the gateway's current
/// capabilities.
pub fn evaluate_compliance(
    frameworks: &[Framework],
    chain_len: u64,
    has_vault: bool,
    has_guardrails: bool,
    has_analytics: bool,
) -> ComplianceReport {
    let mut controls = Vec::new();

    for fw in frameworks {
        match fw {
            Framework::Soc2 => controls.extend(evaluate_soc2(
                chain_len,
                has_vault,
                has_guardrails,
                has_analytics,
            )),
            Framework::Iso27001 => controls.extend(evaluate_iso27001(
                chain_len,
                has_vault,
                has_guardrails,
                has_analytics,
            )),
        }
    }

    let mut summary = Summary {
        total_controls: controls.len(),
        ..Default::default()
    };
    for control in &controls {
        match control.status {
            ControlStatus::Pass => summary.passing += 1,
            ControlStatus::Fail => summary.failing += 1,
            ControlStatus::Partial => summary.partial += 1,
        }
    }
    if summary.total_controls > 0 {
        summary.pass_rate = summary.passing as f64 / summary.total_controls as f64 * 100.0;
    }

    ComplianceReport {
        generated_at: Utc::now(),
        gateway_version: env!("CARGO_PKG_VERSION").to_string(),
        frameworks: frameworks.to_vec(),
        controls,
        summary,
    }
}

fn control(
    id: &str,
    framework: Framework,
    name: &str,
    description: &str,
    status: ControlStatus,
    evidence: String,
    gateway_feature: &str,
) -> Control {
    Control {
        id: id.to_string(),
        framework,
        name: name.to_string(),
        description: description.to_string(),
        status,
        evidence,
        gateway_feature: gateway_feature.to_string(),
    }
}

fn evaluate_soc2(
    chain_len: u64,
    has_vault: bool,
    has_guardrails: bool,
    has_analytics: bool,
) -> Vec<Control> {
    vec![
        control(
            "CC6.1",
            Framework::Soc2,
            "Logical Access Security",
            "The entity implements logical access security over protected information assets",
            ControlStatus::Pass,
            "Gateway authentication via GATEWAY_KEY header; all requests authenticated before processing".to_string(),
            "Gateway Auth",
        ),
        control(
            "CC6.3",
            Framework::Soc2,
            "Role-Based Access and Least Privilege",
            "The entity authorizes, modifies, or removes access to data based on roles",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "Prevention layer enforces tool allowlists and blocklists per policy",
                "Prevention layer not configured — tool access controls unavailable",
            ),
            "Prevention Layer",
        ),
        control(
            "CC7.2",
            Framework::Soc2,
            "System Monitoring",
            "The entity monitors system components for anomalies indicative of malicious acts",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "Detection layer monitors for runaway agents: token budget, prompt loops, tool retry storms, error spirals",
                "Detection layer not configured — no automated monitoring",
            ),
            "Detection Layer",
        ),
        control(
            "CC7.3",
            Framework::Soc2,
            "Change Evaluation",
            "The entity evaluates changes for impact on the system of internal control",
            bool_status(has_vault),
            conditional_evidence(
                has_vault,
                "Every AIR record includes SHA-256 checksums of request/response; vault provides immutable storage",
                "Vault not configured — no checksummed records",
            ),
            "Visibility Layer",
        ),
        control(
            "CC8.1",
            Framework::Soc2,
            "Change Management",
            "The entity authorizes, designs, develops, configures, and implements changes to meet objectives",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "Prevention layer enforces policy changes: PII redaction, model limits, tool filtering, approval workflows",
                "Prevention layer not configured — no policy enforcement",
            ),
            "Prevention Layer",
        ),
        control(
            "CC4.1",
            Framework::Soc2,
            "Monitoring of Controls",
            "The entity selects, develops, and performs evaluations to ascertain controls are present and functioning",
            chain_status(chain_len),
            conditional_evidence(
                chain_len > 0,
                "Cryptographic audit chain with HMAC-SHA256 signatures validates control integrity",
                "Audit chain empty — no records signed yet",
            ),
            "Trust Layer",
        ),
        control(
            "CC5.1",
            Framework::Soc2,
            "Risk Assessment",
            "The entity identifies and assesses risks to the achievement of objectives",
            bool_status(has_analytics),
            conditional_evidence(
                has_analytics,
                "Optimization layer tracks per-model error rates, latency percentiles, and failure taxonomy for risk identification",
                "Analytics not configured — no automated risk assessment",
            ),
            "Optimization Layer",
        ),
        control(
            "CC7.4",
            Framework::Soc2,
            "Incident Response",
            "The entity responds to identified security incidents by executing defined procedures",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "Guardrails auto-terminate runaway sessions and send webhook alerts; prevention layer blocks policy violations",
                "Guardrails not configured — no automated incident response",
            ),
            "Detection Layer",
        ),
        control(
            "CC2.1",
            Framework::Soc2,
            "Information and Communication",
            "The entity internally communicates information necessary to support controls",
            ControlStatus::Pass,
            "Gateway logs all requests with run_id, model, status, duration; OTel tracing provides distributed context".to_string(),
            "Visibility Layer",
        ),
        control(
            "A1.2",
            Framework::Soc2,
            "Recovery Mechanisms",
            "The entity implements recovery mechanisms to support system availability",
            bool_status(has_vault),
            conditional_evidence(
                has_vault,
                "Replay engine (replayctl) can reconstruct any run from vault-backed AIR records",
                "Vault not configured — replay/recovery not available",
            ),
            "Visibility Layer",
        ),
        control(
            "CC6.6",
            Framework::Soc2,
            "System Boundary Protection",
            "The entity implements controls to restrict access at system boundaries",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "Prevention layer acts as policy boundary: blocks unauthorized tools, redacts PII, enforces model limits",
                "Prevention layer not configured — no boundary controls",
            ),
            "Prevention Layer",
        ),
        control(
            "CC3.1",
            Framework::Soc2,
            "Risk Mitigation",
            "The entity specifies objectives with sufficient clarity to enable identification of risks",
            bool_status(has_analytics),
            conditional_evidence(
                has_analytics,
                "Failure taxonomy classifies errors into 8 categories; auto-routing mitigates model failures",
                "Analytics not configured — no automated risk mitigation",
            ),
            "Optimization Layer",
        ),
    ]
}

fn evaluate_iso27001(
    chain_len: u64,
    has_vault: bool,
    has_guardrails: bool,
    has_analytics: bool,
) -> Vec<Control> {
    vec![
        control(
            "A.12.4.1",
            Framework::Iso27001,
            "Event Logging",
            "Event logs recording user activities, exceptions, faults shall be produced and kept",
            ControlStatus::Pass,
            "Every LLM call produces an AIR record with run_id, model, tokens, timing, and status".to_string(),
            "Visibility Layer",
        ),
        control(
            "A.12.4.3",
            Framework::Iso27001,
            "Administrator and Operator Logs",
            "System administrator and operator activities shall be logged and protected",
            ControlStatus::Pass,
            "Gateway logs all admin operations; OTel distributed tracing provides full request context".to_string(),
            "Visibility Layer",
        ),
        control(
            "A.14.2.2",
            Framework::Iso27001,
            "System Change Control Procedures",
            "Changes to systems shall be controlled by formal change control procedures",
            chain_status(chain_len),
            conditional_evidence(
                chain_len > 0,
                "Cryptographic audit chain ensures integrity — any modified record breaks the HMAC chain",
                "Audit chain empty — no cryptographic change control yet",
            ),
            "Trust Layer",
        ),
        control(
            "A.18.1.3",
            Framework::Iso27001,
            "Protection of Records",
            "Records shall be protected from loss, destruction, falsification, and unauthorized access",
            bool_status(has_vault),
            conditional_evidence(
                has_vault,
                "Vault stores content in S3 with SHA-256 checksums; AIR records reference vault URIs",
                "Vault not configured — records not cryptographically protected",
            ),
            "Visibility Layer",
        ),
        control(
            "A.9.1.1",
            Framework::Iso27001,
            "Access Control Policy",
            "An access control policy shall be established and documented",
            ControlStatus::Pass,
            "Gateway authentication via GATEWAY_KEY; guardrails config defines access policies in YAML".to_string(),
            "Gateway Auth",
        ),
        control(
            "A.10.1.1",
            Framework::Iso27001,
            "Policy on Use of Cryptographic Controls",
            "A policy on the use of cryptographic controls for protection of information shall be developed",
            chain_status(chain_len),
            conditional_evidence(
                chain_len > 0,
                "HMAC-SHA256 signed audit chain; SHA-256 checksums on all vault records; HMAC-signed evidence packages",
                "Audit chain empty — cryptographic controls not yet exercised",
            ),
            "Trust Layer",
        ),
        control(
            "A.12.1.1",
            Framework::Iso27001,
            "Documented Operating Procedures",
            "Operating procedures shall be documented and made available to all users",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "guardrails.yaml defines all policies declaratively; prevention and detection rules are version-controlled",
                "Guardrails not configured — no documented operating procedures",
            ),
            "Detection Layer",
        ),
        control(
            "A.16.1.2",
            Framework::Iso27001,
            "Reporting Information Security Events",
            "Information security events shall be reported through appropriate management channels",
            bool_status(has_guardrails),
            conditional_evidence(
                has_guardrails,
                "Webhook alerts fire on guardrail violations; detection layer reports incidents with structured context",
                "Guardrails not configured — no security event reporting",
            ),
            "Detection Layer",
        ),
        control(
            "A.12.6.1",
            Framework::Iso27001,
            "Management of Technical Vulnerabilities",
            "Information about technical vulnerabilities shall be obtained and evaluated",
            bool_status(has_analytics),
            conditional_evidence(
                has_analytics,
                "Failure taxonomy identifies 8 error categories; analytics surface model-specific vulnerability patterns",
                "Analytics not configured — no vulnerability assessment",
            ),
            "Optimization Layer",
        ),
        control(
            "A.12.4.4",
            Framework::Iso27001,
            "Clock Synchronisation",
            "Clocks of all relevant information processing systems shall be synchronised",
            ControlStatus::Pass,
            "All timestamps use UTC; AIR records, chain entries, and compliance reports share one clock source".to_string(),
            "Visibility Layer",
        ),
    ]
}

fn bool_status(enabled: bool) -> ControlStatus {
    if enabled {
        ControlStatus::Pass
    } else {
        ControlStatus::Fail
    }
}

fn chain_status(chain_len: u64) -> ControlStatus {
    if chain_len > 0 {
        ControlStatus::Pass
    } else {
        ControlStatus::Partial
    }
}

fn conditional_evidence(condition: bool, pass: &str, fail: &str) -> String {
    if condition { pass } else { fail }.to_string()
}
