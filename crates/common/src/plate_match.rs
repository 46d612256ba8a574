//! Plate similarity used by the exit gate.
//!
//! A plate read at the exit is compared against the plate stored at entry and
//! the plate registered for the vehicle. The score is the Ratcliff/Obershelp
//! "gestalt" ratio `2 * M / (|a| + |b|)`, where `M` counts characters in the
//! matching blocks found by recursively taking the longest common substring.

use serde::{Deserialize, Serialize};

/// Minimum similarity for an exit plate to be accepted
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.80;

/// Comparison normalization: uppercase, spaces removed
pub fn normalize_for_match(plate: &str) -> String {
    plate.to_uppercase().replace(' ', "")
}

/// Similarity ratio in `[0, 1]` between two plate strings.
///
/// Two empty strings are identical and score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize_for_match(a).chars().collect();
    let b: Vec<char> = normalize_for_match(b).chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

/// Whether `a` and `b` are similar enough to be the same plate
pub fn plates_match(a: &str, b: &str, threshold: f64) -> bool {
    PlateMatch::new(similarity(a, b), threshold).is_match()
}

/// Best similarity of `candidate` against a set of stored plates.
///
/// Stored plates that are empty after normalization are ignored, and an empty
/// candidate never matches, so a missing plate cannot be waved through.
pub fn best_match<'a, I>(candidate: &str, stored: I, threshold: f64) -> PlateMatch
where
    I: IntoIterator<Item = &'a str>,
{
    if normalize_for_match(candidate).is_empty() {
        return PlateMatch::new(0.0, threshold);
    }

    let score = stored
        .into_iter()
        .filter(|plate| !normalize_for_match(plate).is_empty())
        .map(|plate| similarity(candidate, plate))
        .fold(0.0_f64, f64::max);

    PlateMatch::new(score, threshold)
}

/// A similarity score together with the threshold it is judged against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateMatch {
    pub score: f64,
    pub threshold: f64,
}

impl PlateMatch {
    pub fn new(score: f64, threshold: f64) -> Self {
        Self { score, threshold }
    }

    pub fn is_match(&self) -> bool {
        self.score >= self.threshold
    }
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;

        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
///
/// Ties resolve to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    // run[j + 1] = length of the common suffix ending at (i, j)
    let mut prev = vec![0usize; b.len() + 1];

    for i in alo..ahi {
        let mut run = vec![0usize; b.len() + 1];
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = prev[j] + 1;
            run[j + 1] = k;
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        prev = run;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_plates() {
        assert_eq!(similarity("51F12345", "51F12345"), 1.0);
        assert_eq!(similarity("51f 123 45", "51F12345"), 1.0);
    }

    #[test]
    fn test_disjoint_plates() {
        assert_eq!(similarity("AAAA", "1111"), 0.0);
    }

    #[test]
    fn test_empty_strings() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("51F12345", ""), 0.0);
    }

    #[test]
    fn test_single_substitution() {
        // 7 of 8 characters survive in matching blocks
        let score = similarity("51F12345", "51F12845");
        assert!((score - 14.0 / 16.0).abs() < 1e-9);
        assert!(plates_match("51F12345", "51F12845", DEFAULT_MATCH_THRESHOLD));
    }

    #[test]
    fn test_gestalt_ratio_recurses_on_both_sides() {
        // "abcd" vs "bcda": longest block "bcd", nothing left on either side
        let score = similarity("ABCD", "BCDA");
        assert!((score - 6.0 / 8.0).abs() < 1e-9);

        // "qabxcd" vs "abycdf": blocks "ab" and "cd"
        let score = similarity("QABXCD", "ABYCDF");
        assert!((score - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_a_lower_bound() {
        assert!(PlateMatch::new(0.80, 0.80).is_match());
        assert!(!PlateMatch::new(0.79, 0.80).is_match());
        assert!(!plates_match("51F12345", "30A99999", DEFAULT_MATCH_THRESHOLD));
    }

    #[test]
    fn test_best_match_takes_maximum() {
        let result = best_match("51F12345", ["30A99999", "51F12346"], DEFAULT_MATCH_THRESHOLD);
        assert!((result.score - 14.0 / 16.0).abs() < 1e-9);
        assert!(result.is_match());
    }

    #[test]
    fn test_best_match_ignores_missing_plates() {
        let result = best_match("", [""], DEFAULT_MATCH_THRESHOLD);
        assert!(!result.is_match());

        let result = best_match("51F12345", ["", "  "], DEFAULT_MATCH_THRESHOLD);
        assert_eq!(result.score, 0.0);
        assert!(!result.is_match());
    }
}
