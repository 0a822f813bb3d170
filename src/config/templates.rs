//! Built-in phrasing used when the gateway is unavailable or a generation is
//! rejected. Every list is per language; `{topic}` and `{name}` are replaced
//! at compose time.

use serde::{Deserialize, Serialize};

use crate::text::Language;

/// A list of lines in each chat language.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Localized {
    /// English lines
    pub en: Vec<String>,
    /// Chinese lines
    pub zh: Vec<String>,
}

impl Localized {
    fn new(en: &[&str], zh: &[&str]) -> Self {
        Self {
            en: en.iter().map(|s| (*s).to_string()).collect(),
            zh: zh.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Lines for `language`; `Other` falls back to English.
    pub fn get(&self, language: Language) -> &[String] {
        match language {
            Language::Zh => &self.zh,
            Language::En | Language::Other => &self.en,
        }
    }
}

/// Fallback phrasing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Idle lines mixed into the learned pool
    pub idle_phrases: Localized,
    /// Dialogue lead lines (`{topic}`)
    pub lead_templates: Localized,
    /// Dialogue reply lines (`{topic}`)
    pub reply_templates: Localized,
    /// Q&A follow-up lines (`{topic}`)
    pub followup_templates: Localized,
    /// Agent-to-agent mention openers (`{name}`, `{topic}`)
    pub mention_templates: Localized,
    /// Replies to a mention (`{name}`, `{topic}`)
    pub mention_reply_templates: Localized,
    /// Persona styles, picked by a stable hash of the agent name
    pub styles: Localized,
    /// Topic words used when nothing better is known
    pub topics: Localized,
    /// Last-resort idle line
    pub last_resort: Localized,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            idle_phrases: Localized::new(
                &[
                    "anyone farming tonight",
                    "who wants to run the dungeon",
                    "need some iron for armor",
                    "base tour later maybe",
                    "the mob farm is finally working",
                    "trading wheat for emeralds",
                ],
                &["有人一起刷副本吗", "谁有多余的铁", "晚上一起建农场", "刚挖到钻石了", "村民交易所修好了"],
            ),
            lead_templates: Localized::new(
                &[
                    "we should sort out {topic} first",
                    "anyone up for {topic} soon",
                    "thinking about {topic} after this",
                    "lets plan the {topic} run",
                ],
                &["我们先把{topic}搞定", "有人一起弄{topic}吗", "等下去{topic}吧", "先规划一下{topic}"],
            ),
            reply_templates: Localized::new(
                &[
                    "sure, i can bring stuff for {topic}",
                    "count me in on {topic}",
                    "{topic} works, give me a minute",
                    "ok i will handle part of {topic}",
                ],
                &["行，{topic}我来帮忙", "算我一个", "{topic}可以，等我一下", "我去准备材料"],
            ),
            followup_templates: Localized::new(
                &[
                    "yeah {topic} helps a lot",
                    "same, {topic} worked for me",
                    "also check your {topic} setup",
                ],
                &["对，{topic}很有用", "我也是这么弄的", "记得检查一下{topic}"],
            ),
            mention_templates: Localized::new(
                &[
                    "@{name} you still doing {topic}",
                    "@{name} need help with {topic}",
                    "@{name} got spare gear for {topic}",
                ],
                &["@{name} 你还在弄{topic}吗", "@{name} 要不要帮忙", "@{name} 有多余装备吗"],
            ),
            mention_reply_templates: Localized::new(
                &["@{name} yeah almost done", "@{name} sure, meet at spawn", "@{name} give me five min"],
                &["@{name} 快好了", "@{name} 出生点见", "@{name} 等我五分钟"],
            ),
            styles: Localized::new(
                &["brief and practical teammate", "calm and route-focused", "natural and collaborative"],
                &["简短实用队友", "冷静路线型", "自然协作型"],
            ),
            topics: Localized::new(
                &["gear", "iron", "farm", "dungeon", "boss", "route"],
                &["装备", "副本", "路线", "材料", "农场"],
            ),
            last_resort: Localized::new(&["anyone online"], &["有人在线吗"]),
        }
    }
}
