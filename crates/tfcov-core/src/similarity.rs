//! String similarity

/// Unit-cost edit distance (insertions, deletions, substitutions) over chars
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// `1 - distance / max(len(a), len(b))`.
///
/// Identical strings (including two empty ones) score exactly 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / max_len as f64
}

/// Highest-scoring candidate at or above `threshold`.
///
/// Ties go to the lexicographically smallest candidate, so the result does not
/// depend on iteration order.
pub fn best_match<'a>(
    needle: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    threshold: f64,
) -> Option<(&'a str, f64)> {
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let score = similarity(needle, candidate);
        if score < threshold {
            continue;
        }
        best = match best {
            Some((name, best_score))
                if best_score > score || (best_score == score && name <= candidate) =>
            {
                Some((name, best_score))
            }
            _ => Some((candidate, score)),
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("widget", "widget"), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn test_single_substitution() {
        assert_eq!(edit_distance("abc", "abd"), 1);
        assert!((similarity("abc", "abd") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric() {
        for (a, b) in [("kitten", "sitting"), ("widget", "widgets"), ("", "x")] {
            assert_eq!(similarity(a, b), similarity(b, a), "{a} vs {b}");
        }
    }

    #[test]
    fn test_best_match_threshold_and_ties() {
        let names = ["widgets", "widgetz", "gadget"];
        let (name, score) = best_match("widget", names, 0.7).expect("a match");
        assert_eq!(name, "widgets", "tie broken lexicographically");
        assert!(score > 0.8);
        assert!(best_match("zzz", names, 0.7).is_none());
    }
}
