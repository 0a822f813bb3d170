//! Public façade: wires the components together and runs the periodic tasks.
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .config(config)
//!     .agents(directory)
//!     .sink(sink)
//!     .build()?;
//! let tasks = engine.spawn_periodic();
//! engine.handle_user_message("alice", "where do i find iron?");
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::agents::{
    AgentDirectory, AudienceDirectory, DeliverySink, LogSink, NoPrefix, PrefixProvider,
    StaticAudience, StaticDirectory,
};
use crate::config::Config;
use crate::dialogue::{Composer, Courier, DialogueMemory, DialogueScheduler, PendingMessage};
use crate::error::Result;
use crate::gateway::{Gateway, OfflineGenerator, TextGenerator};
use crate::learning::{Bucket, LearningPipeline, LearningStatus, LearningStores};
use crate::limiter::RateLimiter;

/// Substrings that make a user line a question. A line equal to a keyword
/// does not count.
const QUESTION_KEYWORDS: &[&str] = &[
    "?", "？", "how", "what", "where", "why", "怎么", "为何", "为什么", "哪里", "多少", "请问",
    "如何", "能不能", "可以吗",
];

/// Whether a user line should be answered.
///
/// ```
/// use pulsechat::engine::is_question_like;
///
/// assert!(is_question_like("where is the nether portal"));
/// assert!(is_question_like("哪里有铁矿"));
/// assert!(!is_question_like("?"));
/// assert!(!is_question_like("gg everyone"));
/// ```
pub fn is_question_like(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    QUESTION_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword) && lower != *keyword)
}

/// How a user line was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    /// Looked like a question and triggered a reply
    pub question: bool,
    /// Named an online agent
    pub mentioned: bool,
}

/// Background tasks started by [`Engine::spawn_periodic`]. Dropping this
/// aborts them.
#[derive(Debug)]
pub struct PeriodicTasks {
    handles: Vec<JoinHandle<()>>,
}

impl PeriodicTasks {
    /// Stop every task
    pub fn shutdown(self) {}
}

impl Drop for PeriodicTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<Config>,
    generator: Option<Arc<dyn TextGenerator>>,
    data_dir: Option<PathBuf>,
    stores: Option<LearningStores>,
    agents: Option<Arc<dyn AgentDirectory>>,
    audience: Option<Arc<dyn AudienceDirectory>>,
    sink: Option<Arc<dyn DeliverySink>>,
    prefix: Option<Arc<dyn PrefixProvider>>,
    seed: Option<u64>,
}

impl EngineBuilder {
    /// Configuration; normalized on build
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Text generator; defaults to the HTTP gateway when enabled
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Persist phrase stores under `dir`
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Explicit phrase stores; wins over [`EngineBuilder::data_dir`]
    pub fn stores(mut self, stores: LearningStores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Agent population
    pub fn agents(mut self, agents: Arc<dyn AgentDirectory>) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Present real observers
    pub fn audience(mut self, audience: Arc<dyn AudienceDirectory>) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Where delivered lines go; defaults to the log
    pub fn sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Name decoration
    pub fn prefix(mut self, prefix: Arc<dyn PrefixProvider>) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Fix every random choice
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Wire everything together.
    pub fn build(self) -> Result<Arc<Engine>> {
        let config = Arc::new(self.config.unwrap_or_default().normalized());
        let generator: Arc<dyn TextGenerator> = match self.generator {
            Some(generator) => generator,
            None if config.gateway.enabled => Arc::new(Gateway::new(&config.gateway)?),
            None => Arc::new(OfflineGenerator),
        };
        let stores = match (self.stores, &self.data_dir) {
            (Some(stores), _) => stores,
            (None, Some(dir)) => {
                std::fs::create_dir_all(dir)?;
                LearningStores::open_dir(dir, &config)
            },
            (None, None) => LearningStores::in_memory(&config),
        };
        let agents = self
            .agents
            .unwrap_or_else(|| Arc::new(StaticDirectory::default()));
        let audience = self
            .audience
            .unwrap_or_else(|| Arc::new(StaticAudience::default()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));
        let prefix = self.prefix.unwrap_or_else(|| Arc::new(NoPrefix));

        let learning = Arc::new(LearningPipeline::new(
            Arc::clone(&config),
            Arc::clone(&generator),
            stores,
        ));
        let memory = Arc::new(DialogueMemory::new(config.memory.clone()));
        let limiter = Arc::new(match self.seed {
            Some(seed) => RateLimiter::with_seed(config.limiter.clone(), seed),
            None => RateLimiter::new(config.limiter.clone()),
        });
        let composer = Composer::new(
            Arc::clone(&config),
            Arc::clone(&memory),
            Arc::clone(&learning),
            Arc::clone(&agents),
            Arc::clone(&audience),
        );
        let courier = Courier::new(
            Arc::clone(&memory),
            audience,
            sink,
            prefix,
            config.chat.format.clone(),
        );
        let scheduler = Arc::new(DialogueScheduler::new(
            Arc::clone(&config),
            composer,
            limiter,
            generator,
            courier,
            self.seed,
        ));

        info!(
            language = %config.chat.language,
            gateway = config.gateway.enabled,
            learning = config.learning.enabled,
            "Engine ready"
        );
        Ok(Arc::new(Engine {
            config,
            learning,
            scheduler,
            memory,
            agents,
        }))
    }
}

/// The running chat core.
pub struct Engine {
    config: Arc<Config>,
    learning: Arc<LearningPipeline>,
    scheduler: Arc<DialogueScheduler>,
    memory: Arc<DialogueMemory>,
    agents: Arc<dyn AgentDirectory>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("learning", &self.learning)
            .finish_non_exhaustive()
    }
}

fn spawn_scene<F>(future: F) -> Option<JoinHandle<Vec<PendingMessage>>>
where
    F: std::future::Future<Output = Vec<PendingMessage>> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            debug!("No runtime; scene skipped");
            None
        },
    }
}

impl Engine {
    /// Start building an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Effective (normalized) configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Learning pipeline
    pub fn learning(&self) -> &Arc<LearningPipeline> {
        &self.learning
    }

    /// Scene scheduler
    pub fn scheduler(&self) -> &Arc<DialogueScheduler> {
        &self.scheduler
    }

    /// Dialogue memory
    pub fn memory(&self) -> &Arc<DialogueMemory> {
        &self.memory
    }

    /// Feed a real user's line to context memory and the learning pipeline.
    /// Returns whether it was captured for learning.
    pub fn observe(&self, source: &str, text: &str, priority: bool) -> bool {
        self.memory.remember_real_line(source, text);
        self.learning.observe(source, text, priority)
    }

    /// Route one real user line: questions are learned with priority and
    /// answered; other lines are learned unless they name an agent.
    pub fn handle_user_message(&self, source: &str, text: &str) -> Inbound {
        let text = text.trim();
        let lower = text.to_lowercase();
        let mentioned = self
            .agents
            .list_agents()
            .iter()
            .filter(|agent| agent.online && !agent.name.is_empty())
            .any(|agent| lower.contains(&agent.name.to_lowercase()));
        let question = is_question_like(text);

        self.maybe_mention_dialogue(mentioned);
        if question {
            self.observe(source, text, true);
            self.trigger_reactive_reply(text, source, mentioned);
        } else if mentioned {
            self.memory.remember_real_line(source, text);
        } else {
            self.observe(source, text, false);
        }
        Inbound { question, mentioned }
    }

    /// Answer `question` in the background.
    pub fn trigger_reactive_reply(
        &self,
        question: &str,
        source: &str,
        mentioned: bool,
    ) -> Option<JoinHandle<Vec<PendingMessage>>> {
        let scheduler = Arc::clone(&self.scheduler);
        let question = question.to_string();
        let source = source.to_string();
        spawn_scene(async move { scheduler.reactive_reply(&question, &source, mentioned).await })
    }

    /// One idle-chat tick in the background.
    pub fn run_idle_tick(&self) -> Option<JoinHandle<Vec<PendingMessage>>> {
        let scheduler = Arc::clone(&self.scheduler);
        spawn_scene(async move { scheduler.idle_scene().await })
    }

    /// One group-dialogue tick in the background.
    pub fn run_dialogue_tick(&self) -> Option<JoinHandle<Vec<PendingMessage>>> {
        let scheduler = Arc::clone(&self.scheduler);
        spawn_scene(async move { scheduler.group_scene().await })
    }

    /// Maybe start an agent-to-agent mention exchange.
    pub fn maybe_mention_dialogue(&self, user_mentioned: bool) -> Option<JoinHandle<Vec<PendingMessage>>> {
        if user_mentioned || !self.config.dialogue.mention_enabled {
            return None;
        }
        let scheduler = Arc::clone(&self.scheduler);
        spawn_scene(async move { scheduler.mention_scene(user_mentioned).await })
    }

    /// Start a forced refinement on every idle bucket.
    pub fn flush_learning_now(&self) -> bool {
        self.learning.flush_now()
    }

    /// Learning counters
    pub fn learning_status(&self) -> LearningStatus {
        self.learning.status()
    }

    /// Start the idle, dialogue and learning-drain loops.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn_periodic(self: &Arc<Self>) -> PeriodicTasks {
        let dialogue = &self.config.dialogue;
        let mut handles = Vec::with_capacity(3);

        let engine = Arc::clone(self);
        handles.push(spawn_loop(Duration::from_secs(dialogue.idle_interval_secs), move || {
            engine.run_idle_tick();
        }));

        let engine = Arc::clone(self);
        handles.push(spawn_loop(Duration::from_secs(dialogue.group_interval_secs), move || {
            engine.run_dialogue_tick();
        }));

        let engine = Arc::clone(self);
        handles.push(spawn_loop(
            Duration::from_secs(self.config.learning.drain_interval_secs),
            move || {
                for bucket in Bucket::ALL {
                    engine.learning.trigger(bucket, false);
                }
            },
        ));

        info!(
            idle_secs = dialogue.idle_interval_secs,
            group_secs = dialogue.group_interval_secs,
            drain_secs = self.config.learning.drain_interval_secs,
            "Periodic tasks started"
        );
        PeriodicTasks { handles }
    }
}

fn spawn_loop<F>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        timer.tick().await;
        loop {
            timer.tick().await;
            tick();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Agent;
    use crate::text::Language;

    fn engine() -> Arc<Engine> {
        let mut config = Config::default();
        config.dialogue.mention_enabled = false;
        let agents = Arc::new(StaticDirectory::new(vec![Agent::new("a1", "Steve", Language::En)]));
        Engine::builder().config(config).agents(agents).seed(1).build().unwrap()
    }

    #[test]
    fn test_question_keywords() {
        assert!(is_question_like("how do i get to the end"));
        assert!(is_question_like("why?"));
        assert!(!is_question_like("how"));
        assert!(!is_question_like("   "));
        assert!(is_question_like("这个可以吗"));
    }

    #[test]
    fn test_mentioning_line_is_not_learned() {
        let engine = engine();
        let inbound = engine.handle_user_message("alice", "steve built a huge castle today");
        assert_eq!(inbound, Inbound { question: false, mentioned: true });
        assert!(engine.learning().pending(Bucket::General).is_empty());
        assert_eq!(engine.memory().recent_real_lines(Language::En, 4).len(), 1);
    }

    #[test]
    fn test_plain_line_is_learned() {
        let engine = engine();
        let inbound = engine.handle_user_message("alice", "just finished the wheat farm near spawn");
        assert_eq!(inbound, Inbound { question: false, mentioned: false });
        assert_eq!(engine.learning().pending(Bucket::General).len(), 1);
    }

    #[test]
    fn test_scenes_need_a_runtime() {
        let engine = engine();
        assert!(engine.run_idle_tick().is_none());
        assert!(engine.trigger_reactive_reply("where is iron?", "alice", false).is_none());
    }
}
