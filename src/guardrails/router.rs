//! Analytics-driven model routing.

use super::analytics::PerformanceTracker;
use super::config::OptimizationConfig;

/// Result of evaluating the routing rules for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub original_model: String,
    pub routed_model: String,
    /// Condition of the rule that matched, empty if no routing happened.
    pub rule: String,
    pub reason: String,
}

impl RoutingDecision {
    pub fn rerouted(&self) -> bool {
        self.routed_model != self.original_model
    }
}

/// Check whether the requested model should be swapped based on recorded
/// analytics. Rules are evaluated in order and the first match wins; a
/// disabled router or absent tracker returns the original model unchanged.
pub fn evaluate_routing(
    cfg: &OptimizationConfig,
    tracker: Option<&PerformanceTracker>,
    model: &str,
) -> RoutingDecision {
    let mut decision = RoutingDecision {
        original_model: model.to_string(),
        routed_model: model.to_string(),
        rule: String::new(),
        reason: String::new(),
    };

    let Some(tracker) = tracker else {
        return decision;
    };
    if !cfg.router.enabled {
        return decision;
    }

    for rule in &cfg.router.rules {
        if !rule.enabled || rule.from_model != model {
            continue;
        }

        let matched_reason = match rule.condition.as_str() {
            "error_rate" => {
                let rate = tracker.error_rate(model);
                (rate > rule.threshold).then(|| {
                    format!(
                        "error_rate={:.1}% exceeds threshold {:.1}%",
                        rate * 100.0,
                        rule.threshold * 100.0
                    )
                })
            }
            "latency_p95" => {
                let p95 = tracker.latency_p95(model);
                (p95 as f64 > rule.threshold).then(|| {
                    format!(
                        "latency_p95={p95}ms exceeds threshold {:.0}ms",
                        rule.threshold
                    )
                })
            }
            _ => None,
        };

        if let Some(reason) = matched_reason {
            decision.routed_model = rule.to_model.clone();
            decision.rule = rule.condition.clone();
            decision.reason = reason;
            return decision;
        }
    }

    decision
}
