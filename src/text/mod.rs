//! Text primitives: similarity, language classification and content filters.
//!
//! # Normalization
//!
//! Two keys are derived from a line:
//!
//! | Key                   | Produced by              | Used for                      |
//! |-----------------------|--------------------------|-------------------------------|
//! | message key           | [`normalize_message`]    | exact "already said" checks   |
//! | similarity key        | [`normalize`]            | bigram dedup everywhere else  |
//!
//! # Thresholds
//!
//! [`is_similar`] is called with a different threshold at every site. The
//! defaults live in [`crate::config`] and fall in the `0.82..=0.90` range.

mod filters;
mod language;
mod similarity;

pub use filters::{
    collapse_whitespace, compact_content, contains_blocked, contains_placeholder,
    extract_topic_word, filter_mentions, has_meaningful_chars, is_low_signal,
    is_placeholder_credential, looks_like_noise, normalize_topic_key, strip_list_marker,
    strip_control, strip_mentions, strip_role_label, tidy_punctuation, trim_to_chars, trim_to_words,
    truncate_chars, WEAK_ENGLISH_TOKENS,
};
pub use language::{Language, LanguagePreference};
pub use similarity::{
    is_similar, is_too_similar_to_any, normalize, normalize_message, similarity,
    MIN_LENGTH_RATIO,
};
