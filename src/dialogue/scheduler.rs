//! Scenes, the send gate and delayed delivery.
//!
//! A scene composes lines, and [`DialogueScheduler::speak`] runs each one
//! through the final checks and the rate limiter. A granted line becomes a
//! [`PendingMessage`] delivered after a simulated typing delay. Delivery is a
//! timer task; it cannot be cancelled once scheduled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use super::composer::{roll, speech_language, Composer};
use super::memory::DialogueMemory;
use crate::agents::{format_chat_line, Agent, AudienceDirectory, Delivery, DeliverySink, PrefixProvider};
use crate::config::Config;
use crate::gateway::{ProfileKind, TextGenerator};
use crate::limiter::{now_ms, Decision, RateLimiter, ScopeSet};
use crate::text::{contains_placeholder, strip_mentions, Language};

/// A line that passed every check and is waiting for its delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Speaking agent
    pub agent_id: String,
    /// Speaking agent's display name
    pub agent_name: String,
    /// Final text
    pub text: String,
    /// Time from scheduling to delivery
    pub delay: Duration,
}

/// Records a delivered line and hands it to the sink.
#[derive(Clone)]
pub struct Courier {
    memory: Arc<DialogueMemory>,
    audience: Arc<dyn AudienceDirectory>,
    sink: Arc<dyn DeliverySink>,
    prefix: Arc<dyn PrefixProvider>,
    format: String,
}

impl Courier {
    /// Courier writing into `memory` and `sink`
    pub fn new(
        memory: Arc<DialogueMemory>,
        audience: Arc<dyn AudienceDirectory>,
        sink: Arc<dyn DeliverySink>,
        prefix: Arc<dyn PrefixProvider>,
        format: String,
    ) -> Self {
        Self {
            memory,
            audience,
            sink,
            prefix,
            format,
        }
    }

    /// Remember `text` as said by `agent`, then broadcast it.
    pub fn deliver(&self, agent: &Agent, text: &str) {
        self.memory.record_used(text);
        self.memory.remember_agent_line(text);
        self.memory.remember_topic(&agent.id, text);
        self.memory.record_seen(text, &self.audience.present_observers());

        let prefix = self.prefix.prefix(agent);
        let line = format_chat_line(&self.format, &prefix, &agent.name, text);
        self.sink.deliver(Delivery {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            text: text.to_string(),
            line,
        });
    }
}

fn millis_between<R: Rng + ?Sized>(rng: &mut R, min: u64, max: u64) -> Duration {
    Duration::from_millis(rng.gen_range(min..=max.max(min)))
}

fn contains_word(haystack: &str, word: &str) -> Option<usize> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(word).map(|(index, _)| index).find(|&index| {
        let before = haystack[..index].chars().next_back();
        let after = haystack[index + word.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// The agent `text` addresses: an `@name` mention first, else the earliest
/// whole-word name.
pub fn find_mentioned(agents: &[Agent], text: &str) -> Option<Agent> {
    let lower = text.to_lowercase();
    let by_at = lower
        .split('@')
        .skip(1)
        .filter_map(|rest| {
            let handle: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            agents.iter().find(|agent| agent.name.to_lowercase() == handle)
        })
        .next();
    if let Some(agent) = by_at {
        return Some(agent.clone());
    }
    agents
        .iter()
        .filter_map(|agent| {
            let name = agent.name.to_lowercase();
            if name.is_empty() {
                return None;
            }
            contains_word(&lower, &name).map(|index| (index, agent))
        })
        .min_by_key(|(index, _)| *index)
        .map(|(_, agent)| agent.clone())
}

/// Runs scenes and gates every line through the limiter.
pub struct DialogueScheduler {
    config: Arc<Config>,
    composer: Composer,
    limiter: Arc<RateLimiter>,
    generator: Arc<dyn TextGenerator>,
    courier: Courier,
    rng: Mutex<StdRng>,
    next_mention_at: AtomicU64,
}

impl std::fmt::Debug for DialogueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueScheduler")
            .field("next_mention_at", &self.next_mention_at)
            .finish_non_exhaustive()
    }
}

impl DialogueScheduler {
    /// Scheduler with an optional fixed RNG seed
    pub fn new(
        config: Arc<Config>,
        composer: Composer,
        limiter: Arc<RateLimiter>,
        generator: Arc<dyn TextGenerator>,
        courier: Courier,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            composer,
            limiter,
            generator,
            courier,
            rng: Mutex::new(rng),
            next_mention_at: AtomicU64::new(0),
        }
    }

    /// The composer this scheduler draws lines from
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    fn chance(&self, chance: f64) -> bool {
        self.with_rng(|rng| roll(rng, chance))
    }

    fn typing_delay(&self, text: &str) -> Duration {
        let typing = &self.config.typing;
        let base = self.with_rng(|rng| millis_between(rng, typing.base_min_ms, typing.base_max_ms));
        base + Duration::from_millis(text.chars().count() as u64 * typing.per_char_ms)
    }

    /// Final checks, limiter reservation and delayed delivery.
    ///
    /// `None` when the line was rejected or throttled. Nothing is retried.
    pub fn speak(&self, agent: &Agent, text: &str, gap: Duration, priority: bool) -> Option<PendingMessage> {
        let observers = self.composer.observers();
        let fitted = self.with_rng(|rng| self.composer.fit_to_language(agent, text, rng));
        let cleaned = self.composer.sanitize_outgoing(&fitted);
        if cleaned.is_empty() || contains_placeholder(&cleaned) {
            return None;
        }
        let line = self.with_rng(|rng| {
            self.composer
                .dedupe_with_variation(&cleaned, agent.language, &observers, rng)
        })?;
        if contains_placeholder(&line) || self.composer.is_low_signal(&line, agent.language) {
            return None;
        }

        let delay = gap + self.typing_delay(&line);
        let scopes = ScopeSet::for_message(&agent.id, &line);
        if let Decision::Denied(reason) = self.limiter.reserve(&scopes, priority, observers.len()) {
            debug!(agent = %agent.id, ?reason, "Line throttled");
            return None;
        }

        let pending = PendingMessage {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            text: line,
            delay,
        };
        trace!(agent = %agent.id, delay_ms = delay.as_millis() as u64, "Line scheduled");
        self.dispatch(agent.clone(), pending.text.clone(), delay);
        Some(pending)
    }

    fn dispatch(&self, agent: Agent, text: String, delay: Duration) {
        let courier = self.courier.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    courier.deliver(&agent, &text);
                });
            },
            Err(_) => courier.deliver(&agent, &text),
        }
    }

    /// Whether a scene should ask the generator. Strict mode always does.
    fn roll_ai(&self, enabled: bool, chance: f64) -> bool {
        if self.config.dialogue.strict_ai {
            return true;
        }
        enabled && self.generator.channel_status(ProfileKind::Qa).is_ready() && self.chance(chance)
    }

    /// Generate one line for `agent`, retrying with a perturbed seed.
    pub async fn request_single_line(&self, agent: &Agent, scene: &str, seed: &str) -> Option<String> {
        let observers = self.composer.observers();
        for attempt in 0..self.config.dialogue.single_line_max_attempts {
            let seed_text = if attempt == 0 {
                seed.to_string()
            } else {
                format!("{seed} #{}", attempt + 1)
            };
            let prompt = self.with_rng(|rng| self.composer.single_line_prompt(agent, scene, &seed_text, rng));
            let reply = self.generator.generate(&prompt, ProfileKind::Qa).await;
            if let Some(line) = self.composer.parse_single_line(&reply, agent.language, &observers) {
                return Some(line);
            }
        }
        None
    }

    /// One agent says one thing.
    pub async fn idle_scene(&self) -> Vec<PendingMessage> {
        let dialogue = &self.config.dialogue;
        let agents = self.composer.eligible_agents();
        let chosen = self.with_rng(|rng| {
            if agents.is_empty() || !roll(rng, dialogue.idle_chance) {
                return None;
            }
            agents.choose(rng).cloned()
        });
        let Some(agent) = chosen else {
            return Vec::new();
        };

        let seed = self.with_rng(|rng| self.composer.idle_seed(agent.language, rng));
        let text = if self.roll_ai(dialogue.idle_use_ai, dialogue.idle_ai_chance) {
            match self.request_single_line(&agent, "idle", &seed).await {
                Some(line) => line,
                None if dialogue.strict_ai => return Vec::new(),
                None => seed,
            }
        } else {
            seed
        };
        self.speak(&agent, &text, Duration::ZERO, false).into_iter().collect()
    }

    /// A short exchange between several same-language agents.
    pub async fn group_scene(&self) -> Vec<PendingMessage> {
        let dialogue = &self.config.dialogue;
        if !dialogue.group_enabled {
            return Vec::new();
        }
        let language = speech_language(self.config.chat.language);
        let mut agents: Vec<Agent> = self
            .composer
            .eligible_agents()
            .into_iter()
            .filter(|agent| speech_language(agent.language) == language)
            .collect();
        if agents.len() < 2 || !self.chance(dialogue.group_chance) {
            return Vec::new();
        }

        let speakers: Vec<Agent> = self.with_rng(|rng| {
            agents.shuffle(rng);
            let n = agents.len();
            let count = ((n as f64 * dialogue.group_participation_ratio).round() as usize).clamp(2, n);
            agents.truncate(count);
            agents
        });
        let line_count = speakers.len().clamp(2, 4);
        let observers = self.composer.observers();

        let mut lines = Vec::new();
        if self.roll_ai(dialogue.group_use_ai, dialogue.group_ai_chance) {
            let seed_topic = self.with_rng(|rng| self.composer.topic_hint(&speakers[0], "", rng));
            let prompt = self.composer.group_prompt(language, &seed_topic, &speakers);
            let reply = self.generator.generate(&prompt, ProfileKind::Qa).await;
            lines = self.composer.parse_group_lines(&reply, line_count, language, &observers);
            if lines.len() < 2 {
                if dialogue.strict_ai {
                    return Vec::new();
                }
                lines.clear();
            }
        }
        if lines.is_empty() {
            let mut used = HashSet::new();
            let mut previous = String::new();
            for index in 0..line_count {
                let line = self.with_rng(|rng| {
                    self.composer
                        .fallback_dialogue_line(&previous, index == 0, language, &mut used, &observers, rng)
                });
                previous.clone_from(&line);
                lines.push(line);
            }
        }

        let typing = &self.config.typing;
        let mut gap = self.with_rng(|rng| millis_between(rng, typing.scene_gap_min_ms, typing.scene_gap_max_ms));
        let mut scheduled = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let speaker = &speakers[index % speakers.len()];
            let step = self.with_rng(|rng| millis_between(rng, typing.speaker_step_min_ms, typing.speaker_step_max_ms));
            match self.speak(speaker, line, gap, false) {
                Some(pending) => {
                    gap = pending.delay + step;
                    scheduled.push(pending);
                },
                None => gap += step,
            }
        }
        debug!(lines = scheduled.len(), speakers = speakers.len(), "Group scene");
        scheduled
    }

    /// Answer a user's question: one lead, sometimes a follow-up or two.
    pub async fn reactive_reply(&self, question: &str, source: &str, mentioned: bool) -> Vec<PendingMessage> {
        let dialogue = &self.config.dialogue;
        let agents = self.composer.eligible_agents();
        if agents.is_empty() {
            return Vec::new();
        }
        let chat_language = self.config.chat.language;

        let forced = if mentioned {
            match find_mentioned(&agents, question) {
                Some(agent) => Some(agent),
                None => return Vec::new(),
            }
        } else {
            None
        };

        let prompt = self.composer.qa_prompt(question, source);
        let answer = self.generator.generate(&prompt, ProfileKind::Qa).await;
        let mut lead = self.composer.first_answer_line(&answer, Language::classify(&answer));
        if lead.is_empty() {
            if dialogue.strict_ai {
                return Vec::new();
            }
            lead = self
                .with_rng(|rng| self.composer.qa_fallback(chat_language, rng))
                .unwrap_or_default();
        }
        if lead.is_empty() {
            return Vec::new();
        }

        let responders: Vec<Agent> = match &forced {
            Some(agent) => vec![agent.clone()],
            None => {
                let answer_language = match Language::classify(&strip_mentions(&lead)) {
                    Language::Other => speech_language(chat_language),
                    language => language,
                };
                let mut same: Vec<Agent> = agents
                    .iter()
                    .filter(|agent| speech_language(agent.language) == answer_language)
                    .cloned()
                    .collect();
                if same.is_empty() {
                    same = agents;
                }
                self.with_rng(|rng| {
                    same.shuffle(rng);
                    let n = same.len();
                    let count = ((n as f64 * dialogue.reply_chance).floor() as usize).clamp(1, n);
                    same.truncate(count);
                    same
                })
            },
        };

        let lead_gap = self.with_rng(|rng| {
            millis_between(rng, dialogue.qa_lead_delay_min_ms, dialogue.qa_lead_delay_max_ms)
        });
        let Some(first) = self.speak(&responders[0], &lead, lead_gap, true) else {
            return Vec::new();
        };
        let mut scheduled = vec![first];

        if forced.is_some()
            || dialogue.strict_ai
            || responders.len() < 2
            || !self.chance(dialogue.followup_chance)
        {
            return scheduled;
        }

        let lead_text = scheduled[0].text.clone();
        let mut gap = lead_gap;
        for follower in responders.iter().skip(1).take(2) {
            gap += Duration::from_millis(dialogue.qa_follow_step_min_ms)
                + self.with_rng(|rng| {
                    millis_between(rng, dialogue.qa_follow_step_min_ms, dialogue.qa_follow_step_max_ms)
                });
            let fallback = self.with_rng(|rng| self.composer.followup_line(&lead_text, follower.language, rng));
            let text = if self.roll_ai(dialogue.followup_use_ai, dialogue.followup_ai_chance) {
                match self.request_single_line(follower, "followup-reply", &fallback).await {
                    Some(line) => line,
                    None => continue,
                }
            } else {
                fallback
            };
            if let Some(pending) = self.speak(follower, &text, gap, false) {
                scheduled.push(pending);
            }
        }
        scheduled
    }

    /// Two agents exchange a pair of addressed lines.
    ///
    /// Skipped when a real user just addressed an agent, and rate limited by
    /// its own minimum interval.
    pub async fn mention_scene(&self, user_mentioned: bool) -> Vec<PendingMessage> {
        let dialogue = &self.config.dialogue;
        if !dialogue.mention_enabled || user_mentioned {
            return Vec::new();
        }
        let now = now_ms();
        if now < self.next_mention_at.load(Ordering::Acquire) || !self.chance(dialogue.mention_chance) {
            return Vec::new();
        }

        let mut agents = self.composer.eligible_agents();
        if agents.len() < 2 {
            return Vec::new();
        }
        let pair = self.with_rng(|rng| {
            agents.shuffle(rng);
            let speaker = agents[0].clone();
            let language = speech_language(speaker.language);
            let targets: Vec<&Agent> = agents
                .iter()
                .skip(1)
                .filter(|agent| speech_language(agent.language) == language)
                .collect();
            targets.choose(rng).map(|target| (speaker, (*target).clone()))
        });
        let Some((speaker, target)) = pair else {
            return Vec::new();
        };
        self.next_mention_at
            .store(now + dialogue.mention_min_interval_secs * 1000, Ordering::Release);

        let template_lead = self.with_rng(|rng| self.composer.mention_line(&speaker, &target, rng));
        let use_ai = self.roll_ai(dialogue.mention_use_ai, 1.0);
        let ai_chance = if dialogue.strict_ai { 1.0 } else { dialogue.mention_ai_chance };

        let mut lead = template_lead.clone();
        if use_ai && self.chance(ai_chance) {
            match self.request_single_line(&speaker, "mention-lead", &template_lead).await {
                Some(line) => {
                    let addressed = if line.contains('@') {
                        line
                    } else {
                        format!("@{} {line}", target.name)
                    };
                    let cleaned = self.composer.sanitize_outgoing(&addressed);
                    if !cleaned.is_empty() {
                        lead = cleaned;
                    } else if dialogue.strict_ai {
                        return Vec::new();
                    }
                },
                None if dialogue.strict_ai => return Vec::new(),
                None => {},
            }
        }

        let lead_gap = self.with_rng(|rng| millis_between(rng, 1_500, 4_500));
        let mut scheduled = Vec::new();
        if let Some(pending) = self.speak(&speaker, &lead, lead_gap, true) {
            scheduled.push(pending);
        }

        let reply_gap = lead_gap + self.with_rng(|rng| millis_between(rng, 1_750, 4_250));
        let reply = if use_ai && self.chance(ai_chance) {
            match self.request_single_line(&target, "mention-reply", &lead).await {
                Some(line) => self.with_rng(|rng| self.composer.maybe_mention_back(line, &speaker, false, rng)),
                None if dialogue.strict_ai => return scheduled,
                None => self.with_rng(|rng| self.composer.mention_reply(&target, &speaker, &lead, false, rng)),
            }
        } else {
            self.with_rng(|rng| self.composer.mention_reply(&target, &speaker, &lead, false, rng))
        };
        if let Some(pending) = self.speak(&target, &reply, reply_gap, true) {
            scheduled.push(pending);
        }
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents() -> Vec<Agent> {
        vec![
            Agent::new("a1", "Steve", Language::En),
            Agent::new("a2", "Alex", Language::En),
            Agent::new("a3", "Steven", Language::En),
        ]
    }

    #[test]
    fn test_find_mentioned_prefers_at_mention() {
        let found = find_mentioned(&agents(), "steve or @Alex, where is the iron");
        assert_eq!(found.map(|a| a.id), Some("a2".to_string()));
    }

    #[test]
    fn test_find_mentioned_whole_word() {
        let found = find_mentioned(&agents(), "hey steven and steve");
        assert_eq!(found.map(|a| a.id), Some("a3".to_string()));
        assert!(find_mentioned(&agents(), "stevenson is here").is_none());
    }
}
