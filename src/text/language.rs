//! Lightweight script-based language classification.
//!
//! Only the two chat languages agents speak are recognized. The classifier
//! counts ASCII letters against CJK ideographs and decides by ratio, which is
//! enough to reject an off-language generation or pick a same-language pool.

use serde::{Deserialize, Serialize};

/// Chat language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    #[serde(alias = "english")]
    En,
    /// Simplified Chinese
    #[serde(alias = "chinese")]
    Zh,
    /// Neither (numbers, punctuation, other scripts)
    Other,
}

impl Language {
    /// Classify `text`.
    ///
    /// ```
    /// use pulsechat::text::Language;
    ///
    /// assert_eq!(Language::classify("anyone farming tonight"), Language::En);
    /// assert_eq!(Language::classify("今晚刷副本吗"), Language::Zh);
    /// assert_eq!(Language::classify("123 !!"), Language::Other);
    /// ```
    pub fn classify(text: &str) -> Self {
        if text.trim().is_empty() {
            return Language::Other;
        }

        let mut ascii_letters = 0usize;
        let mut cjk = 0usize;
        let mut letters = 0usize;
        for c in text.chars() {
            if c.is_ascii_alphabetic() {
                ascii_letters += 1;
                letters += 1;
            } else if c.is_alphabetic() {
                letters += 1;
            }
            if is_cjk(c) {
                cjk += 1;
            }
        }

        if cjk > 0 && ascii_letters == 0 {
            return Language::Zh;
        }
        if ascii_letters >= 3 && cjk == 0 {
            let ratio = if letters == 0 {
                1.0
            } else {
                ascii_letters as f64 / letters as f64
            };
            if ratio >= 0.75 {
                return Language::En;
            }
        }
        if cjk > 0 && ascii_letters > 0 {
            if cjk >= ascii_letters {
                return Language::Zh;
            }
            if ascii_letters >= 3 && ascii_letters >= cjk * 2 {
                return Language::En;
            }
        }
        if cjk > 0 {
            return Language::Zh;
        }
        if ascii_letters >= 3 {
            return Language::En;
        }
        Language::Other
    }

    /// True when `text` classifies as `self`.
    pub fn matches(self, text: &str) -> bool {
        Self::classify(text) == self
    }

    /// Short code used in logs and prompts.
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
            Language::Other => "other",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "zh" | "chinese" | "cn" => Ok(Language::Zh),
            _ => Err(format!("Unknown chat language: {}", s)),
        }
    }
}

/// Dominant language of a batch of source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguagePreference {
    /// At least the threshold share of classified lines is English.
    EnOnly,
    /// At least the threshold share of classified lines is Chinese.
    ZhOnly,
    /// No language dominates.
    Mixed,
}

impl LanguagePreference {
    /// Detect the dominant language of `lines` given a share `threshold`.
    pub fn detect<S: AsRef<str>>(lines: &[S], threshold: f64) -> Self {
        let mut en = 0usize;
        let mut zh = 0usize;
        for line in lines {
            match Language::classify(line.as_ref()) {
                Language::En => en += 1,
                Language::Zh => zh += 1,
                Language::Other => {},
            }
        }
        let total = en + zh;
        if total == 0 {
            return LanguagePreference::Mixed;
        }
        if en as f64 / total as f64 >= threshold {
            LanguagePreference::EnOnly
        } else if zh as f64 / total as f64 >= threshold {
            LanguagePreference::ZhOnly
        } else {
            LanguagePreference::Mixed
        }
    }

    /// True when a line in `language` is acceptable under this preference.
    pub fn admits(self, language: Language) -> bool {
        match self {
            LanguagePreference::EnOnly => language == Language::En,
            LanguagePreference::ZhOnly => language == Language::Zh,
            LanguagePreference::Mixed => true,
        }
    }
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c) || ('\u{3400}'..='\u{4dbf}').contains(&c)
}
