//! Candidate lines: phrase pools, templates, parsing and anti-repetition.
//!
//! The composer owns no state of its own. It reads the phrase stores, the
//! dialogue memory and the collaborators, and every random choice goes
//! through the caller's RNG.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use super::memory::DialogueMemory;
use super::prompt::{group_prompt, qa_prompt, single_line_prompt, PromptContext};
use crate::agents::{Agent, AgentDirectory, AudienceDirectory};
use crate::config::Config;
use crate::learning::{low_signal, Bucket, LearningPipeline};
use crate::text::{
    collapse_whitespace, contains_placeholder, extract_topic_word, filter_mentions,
    has_meaningful_chars, is_too_similar_to_any, normalize, strip_list_marker, strip_mentions,
    strip_role_label, tidy_punctuation, trim_to_chars, trim_to_words, Language,
};

/// Lines of one generated dialogue must differ by at least this much.
const GROUP_DEDUP_THRESHOLD: f64 = 0.82;
/// Chance a follow-up reuses a learned `QA` phrase.
const FOLLOWUP_LEARNED_CHANCE: f64 = 0.65;
/// Chance a mention reply reuses a learned `QA` phrase.
const MENTION_LEARNED_CHANCE: f64 = 0.70;
/// Extra mention-back chance when a real user addressed an agent.
const MENTION_BACK_BOOST: f64 = 0.10;

const PUNCTUATION_SUFFIXES: [&str; 3] = ["!", "...", "~"];
const TAIL_WORDS: [&str; 4] = [" tbh", " imo", " rn", " fr"];

pub(crate) fn roll<R: Rng + ?Sized>(rng: &mut R, chance: f64) -> bool {
    rng.gen::<f64>() < chance
}

/// Agents speaking `Other` are treated as English speakers.
pub(crate) fn speech_language(language: Language) -> Language {
    match language {
        Language::Zh => Language::Zh,
        Language::En | Language::Other => Language::En,
    }
}

/// True when `text`, mentions aside, is in `language`.
pub fn speaks(language: Language, text: &str) -> bool {
    speech_language(language).matches(&strip_mentions(text))
}

/// Stable 32-bit string hash (`h = 31h + c`), used for persona styles.
fn stable_hash(text: &str) -> i32 {
    text.chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Deterministic rewrite of a repeated line.
///
/// Attempts cycle through three modes: swap the trailing punctuation, append
/// a tail word (English only), or keep the first or last clause. A mode that
/// cannot apply falls through to a punctuation swap.
pub fn rewrite_candidate(message: &str, attempt: usize) -> String {
    if message.trim().is_empty() {
        return String::new();
    }
    match attempt % 3 {
        0 => rewrite_punctuation(message, attempt),
        1 => rewrite_tail_word(message, attempt),
        _ => rewrite_clause(message, attempt),
    }
}

fn rewrite_punctuation(message: &str, attempt: usize) -> String {
    let mut stem = message.trim_end_matches(['.', '!', '?', '~']).trim();
    if stem.is_empty() {
        stem = message.trim();
    }
    format!("{stem}{}", PUNCTUATION_SUFFIXES[attempt % PUNCTUATION_SUFFIXES.len()])
}

fn rewrite_tail_word(message: &str, attempt: usize) -> String {
    if !Language::En.matches(message) {
        return rewrite_punctuation(message, attempt + 1);
    }
    let tail = TAIL_WORDS[attempt % TAIL_WORDS.len()];
    if message.to_lowercase().ends_with(tail.trim()) {
        return rewrite_punctuation(message, attempt + 1);
    }
    format!("{message}{tail}")
}

fn rewrite_clause(message: &str, attempt: usize) -> String {
    let parts: Vec<&str> = message
        .split([',', '.', '!', '?', ';'])
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() < 2 {
        return rewrite_punctuation(message, attempt + 1);
    }
    let picked = if attempt % 2 == 0 { parts[0] } else { parts[parts.len() - 1] }.trim();
    if picked.is_empty() || picked.eq_ignore_ascii_case(message.trim()) {
        return rewrite_punctuation(message, attempt + 1);
    }
    picked.to_string()
}

/// Builds and vets candidate lines.
#[derive(Clone)]
pub struct Composer {
    config: Arc<Config>,
    memory: Arc<DialogueMemory>,
    learning: Arc<LearningPipeline>,
    agents: Arc<dyn AgentDirectory>,
    audience: Arc<dyn AudienceDirectory>,
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer").finish_non_exhaustive()
    }
}

impl Composer {
    /// Composer over shared state and collaborators
    pub fn new(
        config: Arc<Config>,
        memory: Arc<DialogueMemory>,
        learning: Arc<LearningPipeline>,
        agents: Arc<dyn AgentDirectory>,
        audience: Arc<dyn AudienceDirectory>,
    ) -> Self {
        Self {
            config,
            memory,
            learning,
            agents,
            audience,
        }
    }

    /// Online and alive agents
    pub fn eligible_agents(&self) -> Vec<Agent> {
        self.agents
            .list_agents()
            .into_iter()
            .filter(Agent::is_eligible)
            .collect()
    }

    /// Real observers present right now
    pub fn observers(&self) -> Vec<String> {
        self.audience.present_observers()
    }

    pub(crate) fn is_low_signal(&self, text: &str, language: Language) -> bool {
        low_signal(text, speech_language(language) == Language::En, &self.config)
    }

    /// Not recently used and not seen by anyone present.
    pub fn is_fresh(&self, text: &str, observers: &[String]) -> bool {
        !self.memory.is_recently_used(text) && !self.memory.is_seen_by_audience(text, observers)
    }

    /// Collapse whitespace, drop mentions of absent agents, tidy punctuation.
    /// Empty when fewer than two letters or digits remain.
    pub fn sanitize_outgoing(&self, text: &str) -> String {
        let mut value = collapse_whitespace(text);
        if value.is_empty() {
            return value;
        }
        if self.config.memory.filter_absent_mentions {
            let online: Vec<String> = self
                .agents
                .list_agents()
                .into_iter()
                .filter(|agent| agent.online)
                .map(|agent| agent.name.to_lowercase())
                .collect();
            value = filter_mentions(&value, |name| online.contains(&name.to_lowercase()));
        }
        let value = tidy_punctuation(&collapse_whitespace(&value));
        if has_meaningful_chars(&value) {
            value
        } else {
            String::new()
        }
    }

    /// Cut to the configured per-language length.
    pub fn trim_to_length(&self, text: &str, language: Language) -> String {
        match speech_language(language) {
            Language::Zh => trim_to_chars(text, self.config.dialogue.max_chars_zh),
            _ => trim_to_words(text, self.config.dialogue.max_words_en),
        }
    }

    /// The full check a generated line goes through. `None` when rejected.
    fn vet_generated(&self, raw: &str, language: Language, observers: &[String]) -> Option<String> {
        let line = self.sanitize_outgoing(raw);
        let line = self.sanitize_outgoing(&self.trim_to_length(&line, language));
        if line.is_empty()
            || !speaks(language, &line)
            || contains_placeholder(&line)
            || self.is_low_signal(&line, language)
            || !self.is_fresh(&line, observers)
        {
            return None;
        }
        Some(line)
    }

    /// First usable line of a single-line generation.
    pub fn parse_single_line(&self, reply: &str, language: Language, observers: &[String]) -> Option<String> {
        reply
            .lines()
            .map(|raw| strip_list_marker(raw).trim().to_string())
            .filter(|line| !line.is_empty())
            .find_map(|line| self.vet_generated(&line, language, observers))
    }

    /// Up to `max` usable, mutually distinct lines of a group generation.
    pub fn parse_group_lines(
        &self,
        reply: &str,
        max: usize,
        language: Language,
        observers: &[String],
    ) -> Vec<String> {
        let mut lines = Vec::new();
        let mut keys: Vec<String> = Vec::new();
        for raw in reply.lines() {
            if lines.len() >= max {
                break;
            }
            let stripped = strip_role_label(&strip_list_marker(raw));
            let Some(line) = self.vet_generated(&stripped, language, observers) else {
                continue;
            };
            let key = normalize(&line);
            if !key.is_empty() && is_too_similar_to_any(&key, &keys, GROUP_DEDUP_THRESHOLD) {
                continue;
            }
            if !key.is_empty() {
                keys.push(key);
            }
            lines.push(line);
        }
        lines
    }

    /// The first line of a free-form answer, cleaned and cut to length.
    pub fn first_answer_line(&self, answer: &str, language: Language) -> String {
        answer
            .lines()
            .map(|raw| strip_role_label(&strip_list_marker(raw)))
            .map(|line| self.sanitize_outgoing(&line))
            .find(|line| !line.is_empty())
            .map(|line| self.sanitize_outgoing(&self.trim_to_length(&line, language)))
            .unwrap_or_default()
    }

    /// Random learned phrase in `language`.
    ///
    /// `qa_preferred` pools the `QA` store first; otherwise `QA` phrases are
    /// blended in with the configured chance. Recent agent lines are part of
    /// the pool too.
    pub fn pool_phrase<R: Rng + ?Sized>(&self, language: Language, qa_preferred: bool, rng: &mut R) -> Option<String> {
        let mut pool: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut add = |phrases: Vec<String>| {
            for phrase in phrases {
                if speaks(language, &phrase) && seen.insert(phrase.clone()) {
                    pool.push(phrase);
                }
            }
        };
        if qa_preferred {
            add(self.learning.store(Bucket::Qa).all());
        }
        add(self.learning.store(Bucket::General).all());
        if !qa_preferred && roll(rng, self.config.learning.qa_blend_chance) {
            add(self.learning.store(Bucket::Qa).all());
        }
        add(self.memory.agent_lines());

        pool.shuffle(rng);
        pool.into_iter()
            .find(|phrase| !self.is_low_signal(phrase, language) && !self.memory.is_recently_used(phrase))
    }

    /// Random idle phrase: built-in lines plus learned `GENERAL` (and
    /// sometimes `QA`) phrases.
    pub fn idle_phrase<R: Rng + ?Sized>(&self, language: Language, rng: &mut R) -> Option<String> {
        let mut pool: Vec<String> = self.config.templates.idle_phrases.get(language).to_vec();
        pool.extend(self.learning.store(Bucket::General).all());
        if roll(rng, self.config.learning.qa_blend_chance) {
            pool.extend(self.learning.store(Bucket::Qa).all());
        }
        pool.shuffle(rng);
        pool.into_iter().find(|phrase| {
            speaks(language, phrase)
                && !self.is_low_signal(phrase, language)
                && !self.memory.is_recently_used(phrase)
        })
    }

    /// Idle phrase, or the last-resort line when nothing is left.
    pub fn idle_seed<R: Rng + ?Sized>(&self, language: Language, rng: &mut R) -> String {
        self.idle_phrase(language, rng)
            .or_else(|| self.config.templates.last_resort.get(language).choose(rng).cloned())
            .unwrap_or_else(|| match speech_language(language) {
                Language::Zh => "有人在线吗".to_string(),
                _ => "anyone online".to_string(),
            })
    }

    /// Persona style, stable per agent name.
    pub fn style_for(&self, agent: &Agent) -> String {
        let styles = self.config.templates.styles.get(agent.language);
        if styles.is_empty() {
            return "natural and collaborative".to_string();
        }
        let index = stable_hash(&agent.name.to_lowercase()).rem_euclid(styles.len() as i32) as usize;
        styles[index].clone()
    }

    /// Random configured topic word for `language`.
    pub fn default_topic<R: Rng + ?Sized>(&self, language: Language, rng: &mut R) -> String {
        self.config
            .templates
            .topics
            .get(language)
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| match speech_language(language) {
                Language::Zh => "装备".to_string(),
                _ => "gear".to_string(),
            })
    }

    /// Topic for a line by `agent`: the seed's topic word, else one the agent
    /// used recently, else a configured topic.
    pub fn topic_hint<R: Rng + ?Sized>(&self, agent: &Agent, seed: &str, rng: &mut R) -> String {
        let from_seed = extract_topic_word(&strip_mentions(seed));
        if !from_seed.is_empty() && speaks(agent.language, &from_seed) {
            return from_seed;
        }
        let remembered: Vec<String> = self
            .memory
            .agent_topics(&agent.id)
            .into_iter()
            .filter(|topic| speaks(agent.language, topic))
            .collect();
        remembered
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| self.default_topic(agent.language, rng))
    }

    /// Topic word of `text` for a reply in `language`, with fallbacks.
    fn reply_topic(&self, text: &str, language: Language) -> String {
        let topic = extract_topic_word(&strip_mentions(text));
        match speech_language(language) {
            Language::Zh if topic.is_empty() || !Language::Zh.matches(&topic) => "路线".to_string(),
            _ if topic.is_empty() => "route".to_string(),
            _ => topic,
        }
    }

    /// `text` if `agent` speaks its language, else a learned phrase that fits.
    pub fn fit_to_language<R: Rng + ?Sized>(&self, agent: &Agent, text: &str, rng: &mut R) -> String {
        if speaks(agent.language, text) {
            return text.to_string();
        }
        self.pool_phrase(agent.language, false, rng)
            .unwrap_or_else(|| match speech_language(agent.language) {
                Language::Zh => "先备战再下本".to_string(),
                _ => "lets do dungeon prep".to_string(),
            })
    }

    /// `text` if fresh; else a fresh idle phrase; else a fresh rewrite.
    pub fn dedupe_with_variation<R: Rng + ?Sized>(
        &self,
        text: &str,
        language: Language,
        observers: &[String],
        rng: &mut R,
    ) -> Option<String> {
        let candidate = self.sanitize_outgoing(text);
        if candidate.is_empty() {
            return None;
        }
        if self.is_fresh(&candidate, observers) {
            return Some(candidate);
        }

        if let Some(idle) = self.idle_phrase(language, rng) {
            let fallback = self.sanitize_outgoing(&idle);
            if !fallback.is_empty() && self.is_fresh(&fallback, observers) {
                return Some(fallback);
            }
        }

        (0..self.config.memory.repeat_rewrite_attempts)
            .map(|attempt| self.sanitize_outgoing(&rewrite_candidate(&candidate, attempt)))
            .find(|rewritten| !rewritten.is_empty() && self.is_fresh(rewritten, observers))
    }

    /// Fill a random template with `topic`; skips lines already used in this
    /// dialogue, off-language lines and stale lines.
    fn template_line<R: Rng + ?Sized>(
        &self,
        templates: &[String],
        language: Language,
        topic: &str,
        used: &mut HashSet<String>,
        observers: &[String],
        rng: &mut R,
    ) -> Option<String> {
        let mut shuffled: Vec<&String> = templates.iter().collect();
        shuffled.shuffle(rng);
        for template in shuffled {
            let filled = template.replace("{topic}", topic);
            let line = self.sanitize_outgoing(&self.trim_to_length(&self.sanitize_outgoing(&filled), language));
            if line.is_empty() || !speaks(language, &line) || contains_placeholder(&line) {
                continue;
            }
            let key = normalize(&line);
            if key.is_empty() || used.contains(&key) || !self.is_fresh(&line, observers) {
                continue;
            }
            used.insert(key);
            return Some(line);
        }
        None
    }

    /// Template-driven dialogue line: a lead introduces a topic, replies riff
    /// on the topic word of the previous line.
    pub fn fallback_dialogue_line<R: Rng + ?Sized>(
        &self,
        previous: &str,
        first: bool,
        language: Language,
        used: &mut HashSet<String>,
        observers: &[String],
        rng: &mut R,
    ) -> String {
        let mut topic = extract_topic_word(&strip_mentions(previous));
        if topic.is_empty() || !speaks(language, &topic) {
            topic = self.default_topic(language, rng);
        }
        let templates = if first {
            &self.config.templates.lead_templates
        } else {
            &self.config.templates.reply_templates
        };
        if let Some(line) = self.template_line(templates.get(language), language, &topic, used, observers, rng) {
            return line;
        }
        if first {
            return self.pool_phrase(language, false, rng).unwrap_or_else(|| match speech_language(language) {
                Language::Zh => format!("先把{topic}补一补"),
                _ => format!("we should sort out {topic}"),
            });
        }
        self.followup_line(previous, language, rng)
    }

    /// Short line backing up a lead answer.
    pub fn followup_line<R: Rng + ?Sized>(&self, lead: &str, language: Language, rng: &mut R) -> String {
        let topic = self.reply_topic(lead, language);
        if let Some(learned) = self.pool_phrase(language, true, rng) {
            if roll(rng, FOLLOWUP_LEARNED_CHANCE) {
                return learned;
            }
        }
        if let Some(template) = self.config.templates.followup_templates.get(language).choose(rng) {
            let line = template.replace("{topic}", &topic);
            if speaks(language, &line) {
                return line;
            }
        }
        if let Some(idle) = self.idle_phrase(language, rng) {
            return idle;
        }
        match speech_language(language) {
            Language::Zh => format!("先准备 {topic}"),
            _ => format!("we should prepare {topic}"),
        }
    }

    /// Learned `QA` phrase used when a question reply could not be generated.
    pub fn qa_fallback<R: Rng + ?Sized>(&self, language: Language, rng: &mut R) -> Option<String> {
        self.pool_phrase(language, true, rng)
    }

    /// Opening line of an agent-to-agent exchange, always addressing `target`.
    pub fn mention_line<R: Rng + ?Sized>(&self, speaker: &Agent, target: &Agent, rng: &mut R) -> String {
        let topic = self.topic_hint(speaker, "", rng);
        let line = self
            .config
            .templates
            .mention_templates
            .get(speaker.language)
            .choose(rng)
            .map(|template| template.replace("{name}", &target.name).replace("{topic}", &topic))
            .unwrap_or_else(|| format!("@{} we can run a quick dungeon", target.name));
        if line.contains('@') {
            line.trim().to_string()
        } else {
            format!("@{} {}", target.name, line.trim())
        }
    }

    /// Reply from `responder` to a line `speaker` addressed to them.
    pub fn mention_reply<R: Rng + ?Sized>(
        &self,
        responder: &Agent,
        speaker: &Agent,
        seed_line: &str,
        boosted: bool,
        rng: &mut R,
    ) -> String {
        let language = responder.language;
        let topic = self.reply_topic(seed_line, language);
        let learned = self.pool_phrase(language, true, rng);
        let mut reply = match learned {
            Some(phrase) if roll(rng, MENTION_LEARNED_CHANCE) => phrase,
            _ => self
                .config
                .templates
                .mention_reply_templates
                .get(language)
                .choose(rng)
                .map(|template| template.replace("{name}", &speaker.name).replace("{topic}", &topic))
                .unwrap_or_default(),
        };
        if reply.trim().is_empty() {
            reply = match speech_language(language) {
                Language::Zh => format!("我来处理 {topic}"),
                _ => format!("i can take {topic}"),
            };
        }
        self.maybe_mention_back(reply, speaker, boosted, rng)
    }

    /// Prefix `@speaker` with the configured mention-back chance.
    pub fn maybe_mention_back<R: Rng + ?Sized>(&self, reply: String, speaker: &Agent, boosted: bool, rng: &mut R) -> String {
        if reply.contains('@') {
            return reply;
        }
        let mut chance = self.config.dialogue.mention_back_chance;
        if boosted {
            chance = (chance + MENTION_BACK_BOOST).min(1.0);
        }
        if roll(rng, chance) {
            format!("@{} {}", speaker.name, reply)
        } else {
            reply
        }
    }

    fn with_context<T>(&self, language: Language, build: impl FnOnce(&PromptContext<'_>) -> T) -> T {
        let dialogue = &self.config.dialogue;
        let agent_lines = self.memory.recent_agent_lines(language, dialogue.context_agent_lines);
        let real_lines = self.memory.recent_real_lines(language, dialogue.context_real_lines);
        build(&PromptContext {
            language: speech_language(language),
            agent_lines: &agent_lines,
            real_lines: &real_lines,
            max_words_en: dialogue.max_words_en,
            max_chars_zh: dialogue.max_chars_zh,
            advanced: dialogue.advanced_prompts,
        })
    }

    /// Single-line prompt for `agent` in `scene`, seeded by `seed`.
    pub fn single_line_prompt<R: Rng + ?Sized>(&self, agent: &Agent, scene: &str, seed: &str, rng: &mut R) -> String {
        let topic = self.topic_hint(agent, seed, rng);
        let style = self.style_for(agent);
        self.with_context(agent.language, |ctx| single_line_prompt(ctx, scene, &style, &topic))
    }

    /// Group dialogue prompt for `speakers`.
    pub fn group_prompt(&self, language: Language, seed_topic: &str, speakers: &[Agent]) -> String {
        let styled: Vec<(String, String)> = speakers
            .iter()
            .map(|agent| (agent.name.clone(), self.style_for(agent)))
            .collect();
        let line_count = speakers.len().clamp(2, 4);
        self.with_context(language, |ctx| group_prompt(ctx, seed_topic, &styled, line_count))
    }

    /// Question reply prompt in the chat language.
    pub fn qa_prompt(&self, question: &str, source: &str) -> String {
        self.with_context(self.config.chat.language, |ctx| qa_prompt(ctx, question, source))
    }
}
