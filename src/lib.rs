//! airgate - OpenAI-compatible reverse proxy with a cryptographically
//! verifiable audit trail.
//!
//! The gateway sits between AI agents and LLM providers. Every call is
//! forwarded on a synchronous hot path (auth → prevention → detection →
//! upstream → response) while a detached recording path vaults the raw
//! bodies, writes an AIR record, links it into the HMAC audit chain, and
//! updates per-model analytics. Raw prompt/response content never appears
//! in logs, span attributes, or AIR records — only vault references and
//! checksums.
//!
//! # Subsystems
//!
//! - [`proxy`] — ingress pipeline and HTTP surface
//! - [`guardrails`] — per-session detection and prevention policies
//! - [`trust`] — audit chain, compliance evaluation, evidence export
//! - [`vault`] — S3-compatible blob storage for raw content
//! - [`recorder`] — AIR record files (`<run_id>.air.json`)
//! - [`replay`] — checksum-verified reconstruction with drift reporting

pub mod config;
pub mod error;
pub mod guardrails;
pub mod proxy;
pub mod recorder;
pub mod replay;
pub mod telemetry;
pub mod trust;
pub mod vault;
