//! What has been said, by whom, and who saw it.
//!
//! Each group sits behind its own lock so a composer check on recent history
//! never waits on a topic-memory update.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::MemoryConfig;
use crate::text::{
    collapse_whitespace, extract_topic_word, has_meaningful_chars, is_similar, normalize,
    normalize_message, strip_control, strip_mentions, Language,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Push `item` to the back after removing an equal entry, then cap from the
/// front.
fn push_unique_capped<F>(list: &mut VecDeque<String>, item: String, cap: usize, same: F)
where
    F: Fn(&str, &str) -> bool,
{
    list.retain(|existing| !same(existing, &item));
    list.push_back(item);
    while list.len() > cap {
        list.pop_front();
    }
}

#[derive(Debug, Default)]
struct TopicOwners {
    next_seq: u64,
    owners: HashMap<String, (u64, VecDeque<String>)>,
}

/// Recent-history, audience, topic and context memory.
#[derive(Debug)]
pub struct DialogueMemory {
    config: MemoryConfig,
    recent: Mutex<VecDeque<String>>,
    audience: Mutex<HashMap<String, VecDeque<String>>>,
    topics: Mutex<TopicOwners>,
    agent_lines: Mutex<VecDeque<String>>,
    real_lines: Mutex<VecDeque<String>>,
}

impl DialogueMemory {
    /// Empty memory sized by `config`
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            recent: Mutex::default(),
            audience: Mutex::default(),
            topics: Mutex::default(),
            agent_lines: Mutex::default(),
            real_lines: Mutex::default(),
        }
    }

    /// True when `text` (or something close to it) was used recently.
    ///
    /// An empty message key counts as used.
    pub fn is_recently_used(&self, text: &str) -> bool {
        let key = normalize_message(text);
        if key.is_empty() {
            return true;
        }
        let similarity_key = normalize(&key);
        let recent = lock(&self.recent);
        if recent.contains(&key) {
            return true;
        }
        !similarity_key.is_empty()
            && recent
                .iter()
                .any(|used| is_similar(&similarity_key, &normalize(used), self.config.no_repeat_threshold))
    }

    /// Record `text` as the most recent message.
    pub fn record_used(&self, text: &str) {
        let key = normalize_message(text);
        if key.is_empty() {
            return;
        }
        let mut recent = lock(&self.recent);
        push_unique_capped(&mut recent, key, self.config.no_repeat_window, |a, b| a == b);
    }

    /// True when any present observer recently saw something close to `text`.
    pub fn is_seen_by_audience(&self, text: &str, observers: &[String]) -> bool {
        let key = normalize(text);
        if key.is_empty() {
            return false;
        }
        let audience = lock(&self.audience);
        observers.iter().any(|observer| {
            audience
                .get(&observer.to_lowercase())
                .is_some_and(|seen| {
                    seen.iter()
                        .rev()
                        .take(self.config.audience_tail_scan)
                        .any(|seen_key| is_similar(&key, seen_key, self.config.audience_threshold))
                })
        })
    }

    /// Record that every present observer saw `text`; absent observers are
    /// forgotten.
    pub fn record_seen(&self, text: &str, observers: &[String]) {
        let key = normalize(text);
        if key.is_empty() {
            return;
        }
        let present: Vec<String> = observers.iter().map(|o| o.to_lowercase()).collect();
        let mut audience = lock(&self.audience);
        audience.retain(|observer, _| present.contains(observer));
        for observer in present {
            if audience.len() >= self.config.audience_tracked_max && !audience.contains_key(&observer) {
                continue;
            }
            let seen = audience.entry(observer).or_default();
            push_unique_capped(seen, key.clone(), self.config.audience_window, |a, b| a == b);
        }
    }

    /// Remember the topic word of a line `agent` delivered.
    pub fn remember_topic(&self, agent: &str, text: &str) {
        let topic = extract_topic_word(text);
        let owner = agent.trim().to_lowercase();
        if topic.is_empty() || owner.is_empty() {
            return;
        }
        let mut topics = lock(&self.topics);
        topics.next_seq += 1;
        let seq = topics.next_seq;
        let entry = topics.owners.entry(owner).or_default();
        entry.0 = seq;
        push_unique_capped(&mut entry.1, topic, self.config.topic_memory_per_agent, |a, b| {
            a.eq_ignore_ascii_case(b)
        });

        while topics.owners.len() > self.config.topic_owner_max {
            let stalest = topics
                .owners
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(owner, _)| owner.clone());
            match stalest {
                Some(owner) => {
                    topics.owners.remove(&owner);
                },
                None => break,
            }
        }
    }

    /// Topic words `agent` used recently, oldest first
    pub fn agent_topics(&self, agent: &str) -> Vec<String> {
        lock(&self.topics)
            .owners
            .get(&agent.trim().to_lowercase())
            .map(|(_, topics)| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remember a delivered agent line as dialogue context.
    pub fn remember_agent_line(&self, text: &str) {
        let line = collapse_whitespace(text);
        if line.is_empty() {
            return;
        }
        let mut lines = lock(&self.agent_lines);
        push_unique_capped(&mut lines, line, self.config.dialogue_memory_size, |a, b| {
            a.eq_ignore_ascii_case(b)
        });
    }

    /// All remembered agent lines, oldest first
    pub fn agent_lines(&self) -> Vec<String> {
        lock(&self.agent_lines).iter().cloned().collect()
    }

    /// Remember a real user's line as `source: text`, mentions stripped.
    pub fn remember_real_line(&self, source: &str, text: &str) {
        let stripped = strip_mentions(&strip_control(text));
        if !has_meaningful_chars(&stripped) {
            return;
        }
        let owner = if source.trim().is_empty() { "player" } else { source.trim() };
        let mut lines = lock(&self.real_lines);
        lines.push_back(format!("{owner}: {stripped}"));
        while lines.len() > self.config.real_context_size {
            lines.pop_front();
        }
    }

    /// Last `limit` agent lines in `language`, oldest first.
    pub fn recent_agent_lines(&self, language: Language, limit: usize) -> Vec<String> {
        let lines = lock(&self.agent_lines);
        tail_matching(lines.iter(), limit, |line| matches_context_language(line, language))
    }

    /// Last `limit` real-user lines (`source: text`) whose text is in
    /// `language`, oldest first.
    pub fn recent_real_lines(&self, language: Language, limit: usize) -> Vec<String> {
        let lines = lock(&self.real_lines);
        tail_matching(lines.iter(), limit, |line| {
            let message = line.split_once(": ").map_or(line.as_str(), |(_, message)| message);
            matches_context_language(message, language)
        })
    }
}

fn matches_context_language(text: &str, language: Language) -> bool {
    let classified = Language::classify(text);
    if language == Language::Other {
        classified != Language::Other
    } else {
        classified == language
    }
}

fn tail_matching<'a, I, F>(lines: I, limit: usize, keep: F) -> Vec<String>
where
    I: DoubleEndedIterator<Item = &'a String>,
    F: Fn(&String) -> bool,
{
    let mut tail: Vec<String> = lines.rev().filter(|line| keep(*line)).take(limit).cloned().collect();
    tail.reverse();
    tail
}
