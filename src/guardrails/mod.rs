//! Guardrails: per-session detection and prevention for agentic traffic.
//!
//! Detection catches runaway agents (token budgets, prompt loops, tool
//! retry storms, error spirals) over deep-copied session snapshots.
//! Prevention runs first and can rewrite or block a request (PII
//! redaction, tool filtering, cost-based downgrade). Both layers are
//! side-effect-free over their inputs; the proxy orchestrates them.

pub mod alerts;
pub mod analytics;
pub mod approval;
pub mod config;
pub mod detection;
pub mod downgrade;
pub mod failures;
pub mod pii;
pub mod prevention;
pub mod router;
pub mod session;
pub mod similarity;
pub mod toolfilter;

pub use analytics::PerformanceTracker;
pub use config::GuardrailsConfig;
pub use detection::{EvalRequest, Rule, Violation};
pub use session::SessionStore;
