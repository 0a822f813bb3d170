//! Content filters shared by the learning pipeline and the composer.
//!
//! Sanitizers return an empty string when nothing usable is left; predicates
//! answer a single question about a line. None of them consult mutable state.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref MENTION: Regex = Regex::new(r"@([A-Za-z0-9_]{3,16})").unwrap();
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"\s+([,.!?;:])").unwrap();
    static ref NON_CONTENT: Regex = Regex::new(r"[^\p{L}\p{Nd}]+").unwrap();
    static ref PUNCT_ONLY: Regex =
        Regex::new(r"^[\p{P}\p{S}。！？，、…]+$").unwrap();
    static ref SHORT_NUMBER: Regex = Regex::new(r"^\d{1,4}$").unwrap();
    static ref TOPIC_WORD: Regex = Regex::new(r"(?i)\btopic\b").unwrap();
    static ref LIST_MARKER: Regex = Regex::new(r"^[-*\d.\s]+").unwrap();
    static ref ROLE_LABEL: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,15}\s*[:：-]\s*").unwrap();
    static ref TOPIC_SPLIT: Regex = Regex::new(r"[^a-z0-9\u{4e00}-\u{9fff}]+").unwrap();
    static ref TRAILING_PUNCT: Regex = Regex::new(r"[\s,，。?!！？；;：:]+$").unwrap();
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap();
    static ref COLOR_CODE: Regex = Regex::new(r"§[0-9A-Fa-fK-Ok-oRrXx]").unwrap();
}

/// Filler words never used as a topic key.
pub const WEAK_ENGLISH_TOKENS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "into", "onto", "about", "you", "your",
    "our", "ours", "they", "them", "their", "his", "her", "have", "has", "had", "will", "shall",
    "would", "could", "should", "lets", "let", "then", "than", "just", "more", "need", "focus",
    "same", "true", "yeah", "okay", "good", "best", "first",
];

/// Credentials shipped in sample configs. A key matching one of these is
/// treated as unconfigured.
const PLACEHOLDER_CREDENTIALS: &[&str] = &["your_api_key_here", "your-api-key-here"];
const PLACEHOLDER_FRAGMENTS: &[&str] =
    &["replace_with_your_api_key", "replace-your-api-key", "your api key"];

/// Trim and collapse runs of whitespace to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Remove terminal escapes, `§` color codes and control characters.
/// Control characters become spaces so adjacent words stay apart.
pub fn strip_control(text: &str) -> String {
    let without_escapes = ANSI_ESCAPE.replace_all(text, "");
    let without_colors = COLOR_CODE.replace_all(&without_escapes, "");
    without_colors
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Truncate to at most `max_chars` characters, then trim.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.trim().to_string();
    }
    text.chars()
        .take(max_chars)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Drop every `@name` mention and tidy the remaining spacing.
pub fn strip_mentions(text: &str) -> String {
    let stripped = MENTION.replace_all(text, "");
    tidy_punctuation(&collapse_whitespace(&stripped))
}

/// Keep `@name` mentions for which `keep` returns true; drop the rest.
pub fn filter_mentions<F>(text: &str, keep: F) -> String
where
    F: Fn(&str) -> bool,
{
    MENTION
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if keep(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Remove whitespace before `,.!?;:`.
pub fn tidy_punctuation(text: &str) -> String {
    SPACE_BEFORE_PUNCT.replace_all(text, "$1").into_owned()
}

/// At least two letters or digits.
pub fn has_meaningful_chars(text: &str) -> bool {
    text.chars().filter(|c| c.is_alphanumeric()).take(2).count() >= 2
}

/// Letters and digits only, lowercased.
pub fn compact_content(text: &str) -> String {
    NON_CONTENT.replace_all(&text.to_lowercase(), "").into_owned()
}

/// Low-signal lines: punctuation only, under two content characters, a bare
/// short number, a blocklisted line, or (English) a single word of at most
/// two letters.
pub fn is_low_signal(text: &str, english: bool, blocklist: &[String]) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || PUNCT_ONLY.is_match(trimmed) {
        return true;
    }
    if NON_CONTENT.replace_all(trimmed, "").chars().count() < 2 {
        return true;
    }
    if SHORT_NUMBER.is_match(trimmed) {
        return true;
    }
    let lower = trimmed.to_lowercase();
    if blocklist
        .iter()
        .any(|blocked| !blocked.trim().is_empty() && lower == blocked.trim().to_lowercase())
    {
        return true;
    }
    if english {
        let mut words = lower.split_whitespace();
        if let (Some(word), None) = (words.next(), words.next()) {
            return word.chars().count() <= 2;
        }
    }
    false
}

/// True for lines carrying a leaked template token: `{topic}` or the bare
/// word `topic`.
pub fn contains_placeholder(text: &str) -> bool {
    text.to_lowercase().contains("{topic}") || TOPIC_WORD.is_match(text)
}

/// True when `text` contains any of `blocked` (case-insensitive substring).
pub fn contains_blocked(text: &str, blocked: &[String]) -> bool {
    let lower = text.to_lowercase();
    blocked
        .iter()
        .map(|b| b.trim().to_lowercase())
        .any(|b| !b.is_empty() && lower.contains(&b))
}

/// A run of at least `limit` identical characters (`"aaaaa"`, `"!!!!!"`).
pub fn looks_like_noise(text: &str, limit: usize) -> bool {
    if limit <= 1 {
        return false;
    }
    let mut run = 1usize;
    let mut previous: Option<char> = None;
    for c in text.chars() {
        if previous == Some(c) {
            run += 1;
            if run >= limit {
                return true;
            }
        } else {
            run = 1;
        }
        previous = Some(c);
    }
    false
}

/// Strip a leading list marker such as `- `, `* ` or `2. `.
pub fn strip_list_marker(line: &str) -> String {
    LIST_MARKER.replace(line, "").into_owned()
}

/// Strip a leading speaker label such as `Alex: `.
pub fn strip_role_label(line: &str) -> String {
    ROLE_LABEL.replace(line, "").into_owned()
}

/// Keep at most `max_words` whitespace-separated words.
pub fn trim_to_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.trim().to_string();
    }
    words[..max_words].join(" ")
}

/// Keep at most `max_chars` characters and drop dangling punctuation.
pub fn trim_to_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.trim().to_string();
    }
    let cut = truncate_chars(text, max_chars);
    TRAILING_PUNCT.replace(&cut, "").into_owned()
}

/// First content token of at least three characters that is not filler.
///
/// ```
/// use pulsechat::text::extract_topic_word;
///
/// assert_eq!(extract_topic_word("lets go to the nether"), "nether");
/// assert_eq!(extract_topic_word("ok go"), "");
/// ```
pub fn extract_topic_word(text: &str) -> String {
    let lower = text.to_lowercase();
    TOPIC_SPLIT
        .split(&lower)
        .find(|token| token.chars().count() >= 3 && !WEAK_ENGLISH_TOKENS.contains(token))
        .map(str::to_string)
        .unwrap_or_default()
}

/// Rate-limit key for a topic word: letters and digits only, at least two.
pub fn normalize_topic_key(topic: &str) -> String {
    let key = compact_content(topic);
    if key.chars().count() < 2 {
        String::new()
    } else {
        key
    }
}

/// Known sample-config credentials.
pub fn is_placeholder_credential(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    PLACEHOLDER_CREDENTIALS.contains(&normalized.as_str())
        || PLACEHOLDER_FRAGMENTS.iter().any(|f| normalized.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_control() {
        assert_eq!(
            collapse_whitespace(&strip_control("anyone \u{1b}[31mfarming\u{0} tonight")),
            "anyone farming tonight"
        );
        assert_eq!(strip_control("§agreen §lbold"), "green bold");
        assert_eq!(strip_control("rock&roll"), "rock&roll");
        assert_eq!(strip_control("line\none\ttab"), "line one tab");
        assert_eq!(strip_control("a & b"), "a & b");
    }

    #[test]
    fn test_low_signal() {
        let none: Vec<String> = vec![];
        assert!(is_low_signal("???", true, &none));
        assert!(is_low_signal("。。", false, &none));
        assert!(is_low_signal("a", true, &none));
        assert!(is_low_signal("42", true, &none));
        assert!(is_low_signal("gg", true, &none));
        assert!(!is_low_signal("gg wp all", true, &none));
        assert!(!is_low_signal("刷怪", false, &none));

        let blocked = vec!["lol".to_string()];
        assert!(is_low_signal("LOL", true, &blocked));
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(contains_placeholder("lets farm {topic} now"));
        assert!(contains_placeholder("what is the topic here"));
        assert!(contains_placeholder("Topic: iron"));
        assert!(!contains_placeholder("topical farming"));
        assert!(!contains_placeholder("iron farm tonight"));
    }

    #[test]
    fn test_mentions() {
        assert_eq!(strip_mentions("@Steve meet at spawn , ok"), "meet at spawn, ok");
        let filtered = filter_mentions("@Steve and @Alex come", |name| name == "Alex");
        assert_eq!(collapse_whitespace(&filtered), "and @Alex come");
    }

    #[test]
    fn test_noise_runs() {
        assert!(looks_like_noise("hahahaaaaa", 5));
        assert!(!looks_like_noise("haaaa", 5));
        assert!(!looks_like_noise("aaaaaa", 1));
    }

    #[test]
    fn test_line_markers() {
        assert_eq!(strip_list_marker("1. go mine"), "go mine");
        assert_eq!(strip_list_marker("- craft beds"), "craft beds");
        assert_eq!(strip_role_label("Alex: bring food"), "bring food");
    }

    #[test]
    fn test_trimming() {
        assert_eq!(trim_to_words("one two three four", 2), "one two");
        assert_eq!(trim_to_chars("我们先去刷副本，然后", 7), "我们先去刷副本");
        assert_eq!(truncate_chars("  abc  ", 10), "abc");
    }

    #[test]
    fn test_topic_extraction() {
        assert_eq!(extract_topic_word("We should farm iron"), "farm");
        assert_eq!(extract_topic_word("the boss fight"), "boss");
        assert_eq!(extract_topic_word("去刷副本"), "去刷副本");
        assert_eq!(normalize_topic_key("Iron!"), "iron");
        assert_eq!(normalize_topic_key("x"), "");
    }

    #[test]
    fn test_placeholder_credentials() {
        assert!(is_placeholder_credential("YOUR_API_KEY_HERE"));
        assert!(is_placeholder_credential("please-replace-your-api-key"));
        assert!(!is_placeholder_credential("sk-live-123"));
        assert!(!is_placeholder_credential(""));
    }
}
