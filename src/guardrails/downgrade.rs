//! Cost-based model downgrading.

use std::collections::HashMap;

use super::config::ModelLimitConfig;

/// Decide whether the requested model should be swapped for a cheaper
/// alternative, based on the estimated session cost so far. Returns the
/// replacement model, or `None` when no downgrade applies.
pub fn downgrade_model(
    cfg: &ModelLimitConfig,
    model: &str,
    session_tokens: u64,
) -> Option<String> {
    if !cfg.enabled || cfg.cost_threshold_usd == 0.0 {
        return None;
    }

    let cost = estimate_session_cost(&cfg.cost_per_mtoken, model, session_tokens);
    if cost >= cfg.cost_threshold_usd {
        return cfg.downgrade_map.get(model).cloned();
    }

    None
}

/// Approximate session cost: `tokens / 1,000,000 × cost_per_million`.
/// Unknown models cost 0 — no estimate means no downgrade.
pub fn estimate_session_cost(
    cost_map: &HashMap<String, f64>,
    model: &str,
    tokens: u64,
) -> f64 {
    let Some(cost_per_mtoken) = cost_map.get(model) else {
        return 0.0;
    };
    tokens as f64 / 1_000_000.0 * cost_per_mtoken
}
