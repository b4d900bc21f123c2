//! Trust layer: cryptographic audit chain, compliance evaluation, and
//! signed evidence export.

pub mod chain;
pub mod compliance;
pub mod export;

pub use chain::{AuditChain, ChainEntry, ChainVerification};
pub use compliance::{evaluate_compliance, ComplianceReport, Framework};
pub use export::{generate_evidence_package, verify_attestation, EvidencePackage};
