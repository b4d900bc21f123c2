//! Allowlist/blocklist filtering of requested tools.

use std::collections::HashSet;

use super::config::ToolFilterConfig;

/// Apply the tool policy to a set of tool names.
///
/// - A non-empty allowlist keeps only the tools it names.
/// - Otherwise a non-empty blocklist removes the tools it names.
/// - With neither, everything passes through unchanged.
pub fn filter_tools(cfg: &ToolFilterConfig, tools: &[String]) -> Vec<String> {
    if !cfg.enabled || tools.is_empty() {
        return tools.to_vec();
    }

    if !cfg.allowlist.is_empty() {
        let allowed: HashSet<&str> = cfg.allowlist.iter().map(String::as_str).collect();
        return tools
            .iter()
            .filter(|t| allowed.contains(t.as_str()))
            .cloned()
            .collect();
    }

    if !cfg.blocklist.is_empty() {
        let blocked: HashSet<&str> = cfg.blocklist.iter().map(String::as_str).collect();
        return tools
            .iter()
            .filter(|t| !blocked.contains(t.as_str()))
            .cloned()
            .collect();
    }

    tools.to_vec()
}
