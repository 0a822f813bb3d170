//! Parsing a refinement reply into storable phrases.

use super::filter::{low_signal, sanitize_learned_phrase};
use crate::config::Config;
use crate::text::{
    is_too_similar_to_any, normalize, strip_list_marker, strip_mentions, Language,
    LanguagePreference,
};

/// What a refinement reply is checked against.
#[derive(Debug)]
pub struct RefineContext<'a> {
    /// The filtered batch that was sent
    pub sources: &'a [String],
    /// Similarity keys of every phrase already stored, across buckets
    pub existing_keys: &'a [String],
    /// Thresholds and language policy
    pub config: &'a Config,
}

/// Split `reply` into lines and keep the usable ones, in order.
///
/// A line survives when, after stripping list markers and mentions, it is a
/// valid stored phrase in an admitted language, and it is not similar to any
/// source line (copy threshold), any stored phrase or any line already kept
/// from this reply (output dedup threshold).
pub fn parse_refined(reply: &str, ctx: &RefineContext<'_>) -> Vec<String> {
    if reply.trim().is_empty() {
        return Vec::new();
    }
    let learning = &ctx.config.learning;
    let chat_language = ctx.config.chat.language;
    let preference = LanguagePreference::detect(ctx.sources, learning.dominant_language_threshold);
    let source_keys: Vec<String> = ctx
        .sources
        .iter()
        .map(|source| normalize(source))
        .filter(|key| !key.is_empty())
        .collect();

    let mut accepted: Vec<String> = Vec::new();
    let mut accepted_keys: Vec<String> = Vec::new();
    for raw in reply.lines() {
        let stripped = strip_mentions(&strip_list_marker(raw));
        let phrase = sanitize_learned_phrase(&stripped, ctx.config);
        if phrase.is_empty() {
            continue;
        }
        let language = Language::classify(&phrase);
        if low_signal(&phrase, language == Language::En, ctx.config) {
            continue;
        }
        if learning.enforce_chat_language && chat_language != Language::Other && language != chat_language {
            continue;
        }
        if learning.keep_dominant_language && !preference.admits(language) {
            continue;
        }
        let key = normalize(&phrase);
        if key.is_empty()
            || is_too_similar_to_any(&key, &source_keys, learning.copy_threshold)
            || is_too_similar_to_any(&key, ctx.existing_keys, learning.output_dedup_threshold)
            || is_too_similar_to_any(&key, &accepted_keys, learning.output_dedup_threshold)
        {
            continue;
        }
        if !accepted.contains(&phrase) {
            accepted_keys.push(key);
            accepted.push(phrase);
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::similarity;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_copies_and_duplicates_dropped() {
        let config = Config::default();
        let sources = owned(&["who has spare iron ingots", "anyone want to raid the temple"]);
        let existing = vec![normalize("meet me at spawn")];
        let ctx = RefineContext {
            sources: &sources,
            existing_keys: &existing,
            config: &config,
        };
        let reply = "1. Who has spare iron ingots\n\
                     - @Steve need iron, anyone\n\
                     - need iron anyone\n\
                     - meet me at spawn\n\
                     - temple raid later?\n\
                     - 刷副本去\n\
                     - ok";
        let parsed = parse_refined(reply, &ctx);
        assert_eq!(parsed, owned(&["need iron, anyone", "temple raid later?"]));

        for phrase in &parsed {
            for source in &sources {
                assert!(similarity(&normalize(phrase), &normalize(source)) < config.learning.copy_threshold);
            }
        }
    }

    #[test]
    fn test_empty_reply() {
        let config = Config::default();
        let ctx = RefineContext {
            sources: &[],
            existing_keys: &[],
            config: &config,
        };
        assert!(parse_refined("   ", &ctx).is_empty());
    }
}
