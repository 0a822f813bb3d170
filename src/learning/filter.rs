//! Capture-time and batch-time text filters.

use crate::config::Config;
use crate::text::{
    collapse_whitespace, contains_blocked, has_meaningful_chars, is_low_signal, is_similar,
    looks_like_noise, normalize, strip_control, truncate_chars, Language,
};

/// Strip control content, collapse whitespace and cap at
/// `learning.raw_max_length`.
pub fn sanitize_raw(text: &str, config: &Config) -> String {
    truncate_chars(
        &collapse_whitespace(&strip_control(text)),
        config.learning.raw_max_length,
    )
}

/// Low-signal check honoring `memory.filter_low_signal`.
pub(crate) fn low_signal(text: &str, english: bool, config: &Config) -> bool {
    if text.trim().is_empty() {
        return true;
    }
    config.memory.filter_low_signal
        && is_low_signal(text, english, &config.memory.low_signal_blocklist)
}

/// Whether a sanitized observation is worth learning from.
///
/// Rejects commands, short English lines, low-signal lines and
/// repeated-character noise. The per-source throttle is applied separately.
pub fn is_learning_candidate(raw: &str, config: &Config) -> bool {
    let learning = &config.learning;
    if raw.trim().is_empty() || raw.starts_with('/') {
        return false;
    }
    let english = Language::classify(raw) == Language::En;
    if english
        && learning.filter_short_english
        && raw.split_whitespace().count() < learning.min_english_words
    {
        return false;
    }
    if low_signal(raw, english, config) {
        return false;
    }
    !looks_like_noise(raw, learning.max_repeated_char_run)
}

/// Cleanup for a line about to go into a refinement prompt.
fn sanitize_summary_input(text: &str, config: &Config) -> String {
    let learning = &config.learning;
    let value = collapse_whitespace(text);
    let len = value.chars().count();
    if len < learning.min_length || len > learning.input_max_length {
        return String::new();
    }
    if contains_blocked(&value, &learning.block_contains) {
        return String::new();
    }
    value
}

/// Cleanup for a refined phrase about to be stored; empty when unusable.
pub fn sanitize_learned_phrase(text: &str, config: &Config) -> String {
    let learning = &config.learning;
    let value = collapse_whitespace(text);
    let len = value.chars().count();
    if len < learning.min_length || len > learning.max_length {
        return String::new();
    }
    if value.starts_with('/') || !has_meaningful_chars(&value) {
        return String::new();
    }
    if contains_blocked(&value, &learning.block_contains) {
        return String::new();
    }
    value
}

/// Clean a drained batch: drop unusable and low-signal lines, then drop
/// lines similar to an earlier line of the same batch. Order is preserved.
pub fn filter_batch(raw: &[String], config: &Config) -> Vec<String> {
    let threshold = config.learning.input_dedup_threshold;
    let mut kept: Vec<String> = Vec::with_capacity(raw.len());
    let mut keys: Vec<String> = Vec::with_capacity(raw.len());
    for line in raw {
        let cleaned = sanitize_summary_input(line, config);
        if cleaned.is_empty() {
            continue;
        }
        let english = Language::classify(&cleaned) == Language::En;
        if low_signal(&cleaned, english, config) {
            continue;
        }
        let key = normalize(&cleaned);
        if key.is_empty() || keys.iter().any(|seen| is_similar(&key, seen, threshold)) {
            continue;
        }
        if kept.contains(&cleaned) {
            continue;
        }
        keys.push(key);
        kept.push(cleaned);
    }
    kept
}
