//! Name similarity for "did you mean" suggestions.

use std::collections::HashMap;

/// Minimum ratio for a name to be suggested.
pub const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Character-overlap ratio between two names, case-insensitive.
///
/// For every distinct character of `a`, the smaller of its counts in `a` and
/// `b` is summed, and the total is divided by the longer length. Two empty
/// strings are identical.
#[must_use]
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }

    let mut counts_b: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *counts_b.entry(c).or_default() += 1;
    }
    let mut counts_a: HashMap<char, usize> = HashMap::new();
    for c in a.chars() {
        *counts_a.entry(c).or_default() += 1;
    }

    let common: usize = counts_a
        .iter()
        .map(|(c, n)| (*n).min(counts_b.get(c).copied().unwrap_or(0)))
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let ratio = common as f64 / longest as f64;
    ratio
}

/// Returns the candidate most similar to `name` if it reaches the threshold.
///
/// Ties keep the first candidate in iteration order.
pub fn closest_match<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let ratio = similarity_ratio(name, candidate);
        if ratio >= SUGGESTION_THRESHOLD && best.map_or(true, |(_, r)| ratio > r) {
            best = Some((candidate, ratio));
        }
    }
    best.map(|(c, _)| c.to_string())
}
