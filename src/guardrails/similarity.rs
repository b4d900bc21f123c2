//! Word-level Jaccard similarity, used by prompt loop detection and the
//! replay drift check.

use std::collections::HashSet;

/// Jaccard similarity over lowercase whitespace-separated words.
/// 0.0 means completely different, 1.0 identical. Two empty strings are
/// identical; one empty string against a non-empty one scores 0.0.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);

    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    if union == 0 {
        return 1.0;
    }

    intersection as f64 / union as f64
}

fn word_set(s: &str) -> HashSet<String> {
    s.split_whitespace().map(|w| w.to_lowercase()).collect()
}
