//! Configuration management.
//!
//! Every tunable lives in one typed [`Config`] passed by reference (or
//! `Arc`) to the components at construction time. Values come from:
//! - built-in defaults ([`Config::default`])
//! - a TOML file ([`Config::from_file`])
//! - a handful of `PULSE_*` environment variables ([`Config::with_env`])
//!
//! Call [`Config::normalized`] once after loading; it clamps every size and
//! threshold into its legal range so call sites never re-check.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, Result};
use crate::text::Language;

mod templates;

pub use templates::{Localized, TemplateConfig};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat surface settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Text-generation gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Learning pipeline
    #[serde(default)]
    pub learning: LearningConfig,

    /// Rate limiter
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Scene scheduling
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Repetition memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Simulated typing latency
    #[serde(default)]
    pub typing: TypingConfig,

    /// Fallback phrasing
    #[serde(default)]
    pub templates: TemplateConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PulseError::Config(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PulseError::Config(format!("Failed to parse config: {e}")))
    }

    /// Serialize to TOML (used by `pulsechat init-config`)
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Default config file location (`<config dir>/pulsechat/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pulsechat").join("config.toml"))
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay `PULSE_*` environment variables
    pub fn with_env(mut self) -> Self {
        if let Ok(lang) = std::env::var("PULSE_CHAT_LANGUAGE") {
            if let Ok(lang) = lang.parse() {
                self.chat.language = lang;
            }
        }
        for (profile, prefix) in [
            (&mut self.gateway.qa, "PULSE_QA"),
            (&mut self.gateway.summary, "PULSE_SUMMARY"),
        ] {
            if let Ok(url) = std::env::var(format!("{prefix}_API_URL")) {
                profile.api_url = url;
            }
            if let Ok(key) = std::env::var(format!("{prefix}_API_KEY")) {
                profile.api_key = key;
            }
            if let Ok(model) = std::env::var(format!("{prefix}_MODEL")) {
                profile.model = model;
            }
        }
        self
    }

    /// Clamp every tunable into its legal range
    pub fn normalized(mut self) -> Self {
        self.gateway.normalize();
        self.learning.normalize();
        self.limiter.normalize();
        self.dialogue.normalize();
        self.memory.normalize();
        self.typing.normalize();
        self
    }
}

/// Chat surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Dominant chat language (group dialogue, Q&A prompts, refined output)
    pub language: Language,

    /// Output line format; `{prefix}`, `{name}` and `{message}` are replaced
    pub format: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            language: Language::En,
            format: "{prefix}{name}: {message}".to_string(),
        }
    }
}

const QA_MAX_TOKENS: u32 = 64;
const SUMMARY_MAX_TOKENS: u32 = 220;

/// One logical use of the generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Enable this profile
    pub enabled: bool,

    /// Chat-completions endpoint URL
    pub api_url: String,

    /// Bearer credential (may be empty)
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Optional system prompt
    pub system_prompt: String,

    /// Maximum output tokens (0 = the profile's default)
    pub max_tokens: u32,

    /// Retry count override (falls back to `gateway.max_retries`)
    pub retries: Option<u32>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self::with_max_tokens(0)
    }
}

impl ProfileConfig {
    fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            enabled: true,
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            system_prompt: String::new(),
            max_tokens,
            retries: None,
        }
    }
}

/// Text-generation gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Master switch for all profiles
    pub enabled: bool,

    /// Ceiling on concurrent requests; excess calls return empty
    pub max_in_flight: usize,

    /// Default retry count per request
    pub max_retries: u32,

    /// Linear backoff base (`backoff * attempt`)
    pub retry_backoff_ms: u64,

    /// Connect timeout
    pub connect_timeout_ms: u64,

    /// Read timeout
    pub read_timeout_ms: u64,

    /// Profile used for chat lines and Q&A
    pub qa: ProfileConfig,

    /// Profile used for phrase refinement
    pub summary: ProfileConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_in_flight: 24,
            max_retries: 1,
            retry_backoff_ms: 350,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 15_000,
            qa: ProfileConfig::with_max_tokens(QA_MAX_TOKENS),
            summary: ProfileConfig::with_max_tokens(SUMMARY_MAX_TOKENS),
        }
    }
}

impl GatewayConfig {
    fn normalize(&mut self) {
        self.max_in_flight = self.max_in_flight.max(1);
        self.retry_backoff_ms = self.retry_backoff_ms.max(50);
        self.connect_timeout_ms = self.connect_timeout_ms.max(2_000);
        self.read_timeout_ms = self.read_timeout_ms.max(self.connect_timeout_ms);
        if self.qa.max_tokens == 0 {
            self.qa.max_tokens = QA_MAX_TOKENS;
        }
        if self.summary.max_tokens == 0 {
            self.summary.max_tokens = SUMMARY_MAX_TOKENS;
        }
        self.qa.max_tokens = self.qa.max_tokens.max(16);
        self.summary.max_tokens = self.summary.max_tokens.max(32);
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Learning pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Capture observed text at all
    pub enabled: bool,
    /// Raw archive capacity
    pub raw_max_size: usize,
    /// Raw capture length cap (characters)
    pub raw_max_length: usize,
    /// Pending queue capacity per bucket
    pub pending_max_size: usize,
    /// Similarity at which an enqueue is rejected against the queue tail
    pub queue_dedup_threshold: f64,
    /// Queue tail entries scanned on enqueue
    pub queue_dedup_tail_scan: usize,
    /// Entries drained per batch
    pub batch_size: usize,
    /// Filtered batch below this size is requeued
    pub min_filtered_size: usize,
    /// Minimum time between refinements of one bucket
    pub cooldown_secs: u64,
    /// Queue backlog at which the cooldown is skipped (default `3 * batch_size`)
    pub backlog_bypass_threshold: Option<usize>,
    /// Interval of the periodic drain task
    pub drain_interval_secs: u64,
    /// Use the summary profile for refinement
    pub api_refinement_enabled: bool,
    /// Import filtered batches verbatim when the channel is unusable
    pub allow_raw_fallback: bool,
    /// Generation attempts per batch (second attempt uses the corrective prompt)
    pub refine_max_attempts: u32,
    /// Consecutive failures after which one batch is force-imported (0 = never)
    pub force_fallback_after_failures: u32,
    /// Minimum gap between learning warnings per bucket
    pub warning_interval_secs: u64,
    /// In-batch dedup similarity
    pub input_dedup_threshold: f64,
    /// Refined output vs stored phrases and other output lines
    pub output_dedup_threshold: f64,
    /// Refined output vs its own source lines
    pub copy_threshold: f64,
    /// Cap `copy_threshold` at 0.90
    pub strict_no_copy: bool,
    /// Share at which one language dominates a batch
    pub dominant_language_threshold: f64,
    /// Drop refined lines outside the batch's dominant language
    pub keep_dominant_language: bool,
    /// Drop refined lines outside `chat.language`
    pub enforce_chat_language: bool,
    /// Refined store capacity per bucket
    pub max_refined_size: usize,
    /// Stored phrase minimum length (characters)
    pub min_length: usize,
    /// Stored phrase maximum length (characters)
    pub max_length: usize,
    /// Refinement input maximum length (characters)
    pub input_max_length: usize,
    /// Substrings that disqualify a line
    pub block_contains: Vec<String>,
    /// Reject English observations with fewer than `min_english_words`
    pub filter_short_english: bool,
    /// See `filter_short_english`
    pub min_english_words: usize,
    /// Repeated-character run treated as noise
    pub max_repeated_char_run: usize,
    /// Per-source capture cooldown (halved for priority observations)
    pub per_source_cooldown_secs: u64,
    /// Tracked sources before stale throttle entries are pruned
    pub throttle_memory_size: usize,
    /// Chance of blending QA phrases into general pools
    pub qa_blend_chance: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            raw_max_size: 2000,
            raw_max_length: 120,
            pending_max_size: 300,
            queue_dedup_threshold: 0.90,
            queue_dedup_tail_scan: 120,
            batch_size: 20,
            min_filtered_size: 8,
            cooldown_secs: 30,
            backlog_bypass_threshold: None,
            drain_interval_secs: 12,
            api_refinement_enabled: true,
            allow_raw_fallback: false,
            refine_max_attempts: 2,
            force_fallback_after_failures: 5,
            warning_interval_secs: 120,
            input_dedup_threshold: 0.90,
            output_dedup_threshold: 0.86,
            copy_threshold: 0.88,
            strict_no_copy: true,
            dominant_language_threshold: 0.70,
            keep_dominant_language: true,
            enforce_chat_language: true,
            max_refined_size: 1200,
            min_length: 2,
            max_length: 36,
            input_max_length: 90,
            block_contains: Vec::new(),
            filter_short_english: true,
            min_english_words: 3,
            max_repeated_char_run: 5,
            per_source_cooldown_secs: 6,
            throttle_memory_size: 600,
            qa_blend_chance: 0.2,
        }
    }
}

impl LearningConfig {
    fn normalize(&mut self) {
        self.raw_max_size = self.raw_max_size.max(100);
        self.raw_max_length = self.raw_max_length.max(20);
        self.pending_max_size = self.pending_max_size.max(50);
        self.queue_dedup_threshold = self.queue_dedup_threshold.clamp(0.60, 0.99);
        self.queue_dedup_tail_scan = self.queue_dedup_tail_scan.max(20);
        self.batch_size = self.batch_size.max(5);
        self.min_filtered_size = self.min_filtered_size.max(3);
        self.cooldown_secs = self.cooldown_secs.max(5);
        self.backlog_bypass_threshold = Some(
            self.backlog_bypass_threshold
                .unwrap_or(self.batch_size * 3)
                .max(self.batch_size),
        );
        self.drain_interval_secs = self.drain_interval_secs.max(5);
        self.refine_max_attempts = self.refine_max_attempts.max(1);
        self.warning_interval_secs = self.warning_interval_secs.max(30);
        self.input_dedup_threshold = self.input_dedup_threshold.clamp(0.60, 0.99);
        self.output_dedup_threshold = self.output_dedup_threshold.clamp(0.55, 0.99);
        self.copy_threshold = self.copy_threshold.clamp(0.60, 0.99);
        if self.strict_no_copy {
            self.copy_threshold = self.copy_threshold.min(0.90);
        }
        self.dominant_language_threshold = self.dominant_language_threshold.clamp(0.50, 0.95);
        self.max_refined_size = self.max_refined_size.max(200);
        self.min_length = self.min_length.max(1);
        self.max_length = self.max_length.max(self.min_length);
        self.input_max_length = self.input_max_length.max(40);
        self.min_english_words = self.min_english_words.max(2);
        self.max_repeated_char_run = self.max_repeated_char_run.max(4);
        self.throttle_memory_size = self.throttle_memory_size.max(100);
        self.qa_blend_chance = self.qa_blend_chance.clamp(0.0, 1.0);
    }

    /// Backlog bypass threshold, resolved
    pub fn backlog_bypass(&self) -> usize {
        self.backlog_bypass_threshold
            .unwrap_or(self.batch_size * 3)
            .max(self.batch_size)
    }

    /// Cooldown between refinements in milliseconds
    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_secs * 1000
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Enforce limits at all
    pub enabled: bool,
    /// Minimum gap between any two sends
    pub global_cooldown_secs: u64,
    /// Rolling window for burst counting
    pub burst_window_secs: u64,
    /// Sends allowed inside one burst window
    pub burst_max_lines: usize,
    /// Gap before the same topic word may be used again
    pub topic_cooldown_secs: u64,
    /// Per-agent cooldown, lower bound (randomized per send)
    pub agent_cooldown_min_secs: u64,
    /// Per-agent cooldown, upper bound
    pub agent_cooldown_max_secs: u64,
    /// Multiplier applied to the agent cooldown of a priority send
    pub priority_agent_factor: f64,
    /// Scope entries older than this are pruned
    pub stale_after_secs: u64,
    /// Topic scope map capacity
    pub topic_cache_max: usize,
    /// Agent scope map capacity
    pub agent_cache_max: usize,
    /// Deny non-priority sends when too few observers are present
    pub require_observers: bool,
    /// See `require_observers`
    pub min_present_observers: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_cooldown_secs: 4,
            burst_window_secs: 30,
            burst_max_lines: 4,
            topic_cooldown_secs: 120,
            agent_cooldown_min_secs: 20,
            agent_cooldown_max_secs: 75,
            priority_agent_factor: 0.6,
            stale_after_secs: 1800,
            topic_cache_max: 4000,
            agent_cache_max: 1000,
            require_observers: true,
            min_present_observers: 1,
        }
    }
}

impl LimiterConfig {
    fn normalize(&mut self) {
        self.burst_window_secs = self.burst_window_secs.max(5);
        self.burst_max_lines = self.burst_max_lines.max(1);
        self.agent_cooldown_min_secs = self.agent_cooldown_min_secs.max(2);
        self.agent_cooldown_max_secs = self.agent_cooldown_max_secs.max(self.agent_cooldown_min_secs);
        self.priority_agent_factor = self.priority_agent_factor.clamp(0.1, 1.0);
        self.stale_after_secs = self.stale_after_secs.max(300);
        self.topic_cache_max = self.topic_cache_max.max(200);
        self.agent_cache_max = self.agent_cache_max.max(100);
    }
}

/// Scene scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Idle tick interval (0 disables the idle task)
    pub idle_interval_secs: u64,
    /// Chance an idle tick produces a line
    pub idle_chance: f64,
    /// Ask the gateway for idle lines
    pub idle_use_ai: bool,
    /// Chance an idle line is generated rather than taken from the pool
    pub idle_ai_chance: f64,

    /// Run multi-agent dialogue scenes
    pub group_enabled: bool,
    /// Dialogue tick interval
    pub group_interval_secs: u64,
    /// Chance a dialogue tick starts a scene
    pub group_chance: f64,
    /// Share of eligible agents taking part
    pub group_participation_ratio: f64,
    /// Ask the gateway for dialogue lines
    pub group_use_ai: bool,
    /// Chance a scene is generated rather than templated
    pub group_ai_chance: f64,

    /// Skip template/pool fallbacks whenever the gateway is available
    pub strict_ai: bool,

    /// Share of same-language agents that may answer a question
    pub reply_chance: f64,
    /// Chance of follow-up replies after the lead answer
    pub followup_chance: f64,
    /// Ask the gateway for follow-ups
    pub followup_use_ai: bool,
    /// Chance a follow-up is generated
    pub followup_ai_chance: f64,
    /// Lead answer delay, lower bound
    pub qa_lead_delay_min_ms: u64,
    /// Lead answer delay, upper bound
    pub qa_lead_delay_max_ms: u64,
    /// Follow-up stagger step, lower bound
    pub qa_follow_step_min_ms: u64,
    /// Follow-up stagger step, upper bound
    pub qa_follow_step_max_ms: u64,

    /// Agents occasionally address each other by `@name`
    pub mention_enabled: bool,
    /// Chance per user message of a mention exchange
    pub mention_chance: f64,
    /// Minimum gap between mention exchanges
    pub mention_min_interval_secs: u64,
    /// Ask the gateway for mention lines
    pub mention_use_ai: bool,
    /// Chance a mention line is generated
    pub mention_ai_chance: f64,
    /// Chance the reply mentions the speaker back
    pub mention_back_chance: f64,

    /// Use the detailed prompt variants
    pub advanced_prompts: bool,
    /// Recent agent lines embedded in prompts
    pub context_agent_lines: usize,
    /// Recent user lines embedded in prompts
    pub context_real_lines: usize,
    /// English line word cap
    pub max_words_en: usize,
    /// Chinese line character cap
    pub max_chars_zh: usize,
    /// Gateway attempts for one line before giving up
    pub single_line_max_attempts: u32,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 15,
            idle_chance: 0.4,
            idle_use_ai: true,
            idle_ai_chance: 0.70,
            group_enabled: true,
            group_interval_secs: 180,
            group_chance: 0.2,
            group_participation_ratio: 0.35,
            group_use_ai: true,
            group_ai_chance: 0.85,
            strict_ai: false,
            reply_chance: 0.2,
            followup_chance: 0.2,
            followup_use_ai: true,
            followup_ai_chance: 0.65,
            qa_lead_delay_min_ms: 6_000,
            qa_lead_delay_max_ms: 12_000,
            qa_follow_step_min_ms: 4_500,
            qa_follow_step_max_ms: 8_500,
            mention_enabled: true,
            mention_chance: 0.02,
            mention_min_interval_secs: 240,
            mention_use_ai: true,
            mention_ai_chance: 0.75,
            mention_back_chance: 0.45,
            advanced_prompts: true,
            context_agent_lines: 8,
            context_real_lines: 4,
            max_words_en: 14,
            max_chars_zh: 22,
            single_line_max_attempts: 2,
        }
    }
}

impl DialogueConfig {
    fn normalize(&mut self) {
        self.idle_chance = self.idle_chance.clamp(0.0, 1.0);
        self.idle_ai_chance = self.idle_ai_chance.clamp(0.0, 1.0);
        self.group_interval_secs = self.group_interval_secs.max(30);
        self.group_chance = self.group_chance.clamp(0.0, 1.0);
        self.group_participation_ratio = self.group_participation_ratio.clamp(0.2, 1.0);
        self.group_ai_chance = self.group_ai_chance.clamp(0.0, 1.0);
        self.reply_chance = self.reply_chance.clamp(0.0, 1.0);
        self.followup_chance = self.followup_chance.clamp(0.0, 1.0);
        self.followup_ai_chance = self.followup_ai_chance.clamp(0.0, 1.0);
        self.qa_lead_delay_min_ms = self.qa_lead_delay_min_ms.max(1_000);
        self.qa_lead_delay_max_ms = self.qa_lead_delay_max_ms.max(self.qa_lead_delay_min_ms);
        self.qa_follow_step_min_ms = self.qa_follow_step_min_ms.max(1_500);
        self.qa_follow_step_max_ms = self.qa_follow_step_max_ms.max(self.qa_follow_step_min_ms);
        self.mention_chance = self.mention_chance.clamp(0.0, 1.0);
        self.mention_min_interval_secs = self.mention_min_interval_secs.max(30);
        self.mention_ai_chance = self.mention_ai_chance.clamp(0.0, 1.0);
        self.mention_back_chance = self.mention_back_chance.clamp(0.0, 1.0);
        self.context_agent_lines = self.context_agent_lines.max(2);
        self.max_words_en = self.max_words_en.max(6);
        self.max_chars_zh = self.max_chars_zh.max(8);
        self.single_line_max_attempts = self.single_line_max_attempts.max(1);
    }
}

/// Repetition memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Recently delivered message keys retained
    pub no_repeat_window: usize,
    /// Similarity at which a candidate repeats recent history
    pub no_repeat_threshold: f64,
    /// Similarity at which a candidate repeats what an observer saw
    pub audience_threshold: f64,
    /// Seen entries scanned per observer
    pub audience_tail_scan: usize,
    /// Seen entries retained per observer
    pub audience_window: usize,
    /// Observers tracked
    pub audience_tracked_max: usize,
    /// Agent lines retained for prompts and phrase pools
    pub dialogue_memory_size: usize,
    /// User lines retained for prompts
    pub real_context_size: usize,
    /// Topic words retained per agent
    pub topic_memory_per_agent: usize,
    /// Agents with topic memory retained
    pub topic_owner_max: usize,
    /// Rewrites tried when a candidate repeats
    pub repeat_rewrite_attempts: usize,
    /// Reject low-signal candidates
    pub filter_low_signal: bool,
    /// Exact lines treated as low signal
    pub low_signal_blocklist: Vec<String>,
    /// Remove `@name` mentions of names not currently present
    pub filter_absent_mentions: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            no_repeat_window: 40,
            no_repeat_threshold: 0.84,
            audience_threshold: 0.82,
            audience_tail_scan: 24,
            audience_window: 120,
            audience_tracked_max: 400,
            dialogue_memory_size: 80,
            real_context_size: 120,
            topic_memory_per_agent: 12,
            topic_owner_max: 600,
            repeat_rewrite_attempts: 2,
            filter_low_signal: true,
            low_signal_blocklist: Vec::new(),
            filter_absent_mentions: true,
        }
    }
}

impl MemoryConfig {
    fn normalize(&mut self) {
        self.no_repeat_window = self.no_repeat_window.max(10);
        self.no_repeat_threshold = self.no_repeat_threshold.clamp(0.55, 0.99);
        self.audience_threshold = self.audience_threshold.clamp(0.55, 0.99);
        self.audience_tail_scan = self.audience_tail_scan.max(8);
        self.audience_window = self.audience_window.max(20);
        self.audience_tracked_max = self.audience_tracked_max.max(50);
        self.dialogue_memory_size = self.dialogue_memory_size.max(20);
        self.real_context_size = self.real_context_size.max(20);
        self.topic_memory_per_agent = self.topic_memory_per_agent.max(3);
        self.topic_owner_max = self.topic_owner_max.max(50);
    }
}

/// Simulated typing latency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    /// Base latency, lower bound
    pub base_min_ms: u64,
    /// Base latency, upper bound
    pub base_max_ms: u64,
    /// Added per character of the message
    pub per_char_ms: u64,
    /// First speaker gap in a dialogue scene, lower bound
    pub scene_gap_min_ms: u64,
    /// First speaker gap in a dialogue scene, upper bound
    pub scene_gap_max_ms: u64,
    /// Stagger between dialogue speakers, lower bound
    pub speaker_step_min_ms: u64,
    /// Stagger between dialogue speakers, upper bound
    pub speaker_step_max_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            base_min_ms: 750,
            base_max_ms: 1_750,
            per_char_ms: 100,
            scene_gap_min_ms: 1_000,
            scene_gap_max_ms: 2_500,
            speaker_step_min_ms: 1_400,
            speaker_step_max_ms: 3_150,
        }
    }
}

impl TypingConfig {
    fn normalize(&mut self) {
        self.base_max_ms = self.base_max_ms.max(self.base_min_ms);
        self.per_char_ms = self.per_char_ms.max(1);
        self.scene_gap_max_ms = self.scene_gap_max_ms.max(self.scene_gap_min_ms);
        self.speaker_step_max_ms = self.speaker_step_max_ms.max(self.speaker_step_min_ms);
    }
}
