//! Bigram-overlap similarity.
//!
//! Every dedup decision in the crate (learning queue, refinement output,
//! outgoing repetition checks) goes through [`normalize`] and
//! [`is_similar`], each call site with its own threshold.
//!
//! # Algorithm
//!
//! Dice coefficient over character bigrams, counted as a multiset:
//!
//! ```text
//! sim(a, b) = 2 * |bigrams(a) ∩ bigrams(b)| / (|a| - 1 + |b| - 1)
//! ```
//!
//! A bigram of `b` consumes at most one matching occurrence in `a`, so
//! repeated bigrams are not double counted.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Pairs whose `shorter / longer` length ratio is below this are never similar.
pub const MIN_LENGTH_RATIO: f64 = 0.45;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref MENTION: Regex = Regex::new(r"@[A-Za-z0-9_]{3,16}").unwrap();
    static ref NON_CONTENT: Regex = Regex::new(r"[^\p{L}\p{Nd}]+").unwrap();
}

/// Collapse whitespace and lowercase. Used as the exact-match key for
/// recently used messages.
pub fn normalize_message(text: &str) -> String {
    WHITESPACE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// Similarity key: lowercase, no mentions, letters and digits only.
///
/// ```
/// use pulsechat::text::normalize;
///
/// assert_eq!(normalize("@Steve Lets go   MINING!!"), "letsgomining");
/// ```
pub fn normalize(text: &str) -> String {
    let lowered = normalize_message(text);
    if lowered.is_empty() {
        return lowered;
    }
    let without_mentions = MENTION.replace_all(&lowered, "");
    NON_CONTENT.replace_all(&without_mentions, "").into_owned()
}

/// Dice coefficient over character bigrams, in `[0, 1]`.
///
/// Empty input yields `0.0`; identical input yields `1.0`; a string shorter
/// than two characters has no bigrams and yields `0.0` against anything else.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let left: Vec<char> = a.chars().collect();
    let right: Vec<char> = b.chars().collect();
    if left.len() < 2 || right.len() < 2 {
        return 0.0;
    }

    let mut remaining: HashMap<(char, char), usize> = HashMap::with_capacity(left.len());
    for pair in left.windows(2) {
        *remaining.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut intersection = 0usize;
    for pair in right.windows(2) {
        if let Some(count) = remaining.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    let total = (left.len() - 1) + (right.len() - 1);
    (2.0 * intersection as f64) / total as f64
}

/// True when the keys are equal or their similarity reaches `threshold`.
///
/// Keys are expected to be already [`normalize`]d. Empty keys never match.
pub fn is_similar(a: &str, b: &str, threshold: f64) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let shorter = len_a.min(len_b) as f64;
    let longer = len_a.max(len_b) as f64;
    if shorter / longer < MIN_LENGTH_RATIO {
        return false;
    }
    similarity(a, b) >= threshold
}

/// True when `key` is similar to any of `candidates`.
pub fn is_too_similar_to_any<'a, I>(key: &str, candidates: I, threshold: f64) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    candidates
        .into_iter()
        .any(|candidate| is_similar(key, candidate, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_noise() {
        assert_eq!(normalize("  Hello,   World! "), "helloworld");
        assert_eq!(normalize("@alex_01 need iron?"), "neediron");
        assert_eq!(normalize("!!!"), "");
        assert_eq!(normalize("去 下本 吧"), "去下本吧");
    }

    #[test]
    fn test_identical_and_empty() {
        assert!((similarity("mining", "mining") - 1.0).abs() < f64::EPSILON);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("a", "b"), 0.0);
        assert_eq!(similarity("a", "ab"), 0.0);
    }

    #[test]
    fn test_multiset_consumption() {
        // "aaaa" has three "aa" bigrams, "aa" has one: only one may match.
        let sim = similarity("aaaa", "aa");
        assert!((sim - 0.5).abs() < 1e-9, "got {sim}");
    }

    #[test]
    fn test_near_duplicate_phrases() {
        let a = normalize("lets go mining");
        let b = normalize("lets go mining now");
        let sim = similarity(&a, &b);
        assert!(sim >= 0.84, "got {sim}");
        assert!(is_similar(&a, &b, 0.84));
    }

    #[test]
    fn test_length_ratio_prefilter() {
        // Containment would score high, but the ratio is far below 0.45.
        assert!(!is_similar("mine", "mineshaftdiamondhunting", 0.1));
    }

    #[test]
    fn test_too_similar_to_any() {
        let keys = vec![normalize("farm iron tonight"), normalize("boss at nine")];
        assert!(is_too_similar_to_any(&normalize("farm iron tonight!"), &keys, 0.9));
        assert!(!is_too_similar_to_any(&normalize("anyone trading"), &keys, 0.9));
    }

    proptest! {
        #[test]
        fn prop_similarity_is_symmetric(a in "[a-z]{0,24}", b in "[a-z]{0,24}") {
            let ab = similarity(&a, &b);
            let ba = similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-12);
        }

        #[test]
        fn prop_similarity_is_bounded(a in "\\PC{0,30}", b in "\\PC{0,30}") {
            let sim = similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&sim));
        }

        #[test]
        fn prop_identical_non_empty_is_one(a in "[a-z0-9]{1,30}") {
            prop_assert!((similarity(&a, &a) - 1.0).abs() < f64::EPSILON);
        }
    }
}
