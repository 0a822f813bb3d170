//! Scene and delivery tests through the public engine API.
//!
//! Without a tokio runtime delivery happens inline, so the synchronous tests
//! read the sink right after `speak`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pulsechat::config::Localized;
use pulsechat::gateway::GenerateFuture;
use pulsechat::{
    Agent, ChannelSink, ChannelStatus, Config, Delivery, Engine, Language, ProfileKind,
    StaticAudience, StaticDirectory, TextGenerator,
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Always answers with the same text.
struct FixedGenerator {
    reply: String,
    calls: AtomicUsize,
}

impl FixedGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TextGenerator for FixedGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str, _kind: ProfileKind) -> GenerateFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        })
    }

    fn channel_status(&self, _kind: ProfileKind) -> ChannelStatus {
        ChannelStatus::Ready
    }
}

fn steve() -> Agent {
    Agent::new("a1", "Steve", Language::En)
}

fn alex() -> Agent {
    Agent::new("a2", "Alex", Language::En)
}

/// Quiet config: no scheduled randomness, no limiter, fast typing.
fn quiet_config() -> Config {
    let mut config = Config::default();
    config.limiter.enabled = false;
    config.dialogue.mention_enabled = false;
    config.dialogue.followup_chance = 0.0;
    config.dialogue.idle_use_ai = false;
    config.dialogue.group_use_ai = false;
    config.dialogue.qa_lead_delay_min_ms = 1_000;
    config.dialogue.qa_lead_delay_max_ms = 1_000;
    config.typing.base_min_ms = 0;
    config.typing.base_max_ms = 0;
    config.typing.per_char_ms = 1;
    config
}

fn engine_with(
    config: Config,
    agents: Vec<Agent>,
    generator: Arc<dyn TextGenerator>,
) -> (Arc<Engine>, UnboundedReceiver<Delivery>) {
    let (sink, deliveries) = ChannelSink::new();
    let engine = Engine::builder()
        .config(config)
        .generator(generator)
        .agents(Arc::new(StaticDirectory::new(agents)))
        .audience(Arc::new(StaticAudience::new(["alice"])))
        .sink(Arc::new(sink))
        .seed(11)
        .build()
        .unwrap();
    (engine, deliveries)
}

async fn next_delivery(deliveries: &mut UnboundedReceiver<Delivery>) -> Delivery {
    tokio::time::timeout(Duration::from_secs(10), deliveries.recv())
        .await
        .expect("delivery timed out")
        .expect("sink closed")
}

#[test]
fn test_near_repeat_rejected_without_rewrites() {
    let mut config = quiet_config();
    config.memory.repeat_rewrite_attempts = 0;
    config.templates.idle_phrases = Localized::default();
    let (engine, mut deliveries) = engine_with(config, vec![steve()], FixedGenerator::new(""));
    let scheduler = engine.scheduler();

    let first = scheduler.speak(&steve(), "lets go mining", Duration::ZERO, false);
    assert_eq!(first.map(|p| p.text), Some("lets go mining".to_string()));
    let delivered = deliveries.try_recv().unwrap();
    assert_eq!(delivered.line, "Steve: lets go mining");

    assert!(scheduler
        .speak(&steve(), "lets go mining now", Duration::ZERO, false)
        .is_none());
    assert!(deliveries.try_recv().is_err());
}

#[test]
fn test_near_repeat_rewritten_when_allowed() {
    let mut config = quiet_config();
    config.templates.idle_phrases = Localized::default();
    let (engine, mut deliveries) = engine_with(config, vec![steve()], FixedGenerator::new(""));
    let scheduler = engine.scheduler();

    scheduler.speak(&steve(), "lets go mining", Duration::ZERO, false).unwrap();
    deliveries.try_recv().unwrap();

    // the punctuation swap is still a near repeat; the tail word is not
    let rewritten = scheduler
        .speak(&steve(), "lets go mining now", Duration::ZERO, false)
        .unwrap();
    assert_eq!(rewritten.text, "lets go mining now imo");
}

#[test]
fn test_placeholder_lines_never_sent() {
    let (engine, mut deliveries) = engine_with(quiet_config(), vec![steve()], FixedGenerator::new(""));
    let scheduler = engine.scheduler();

    assert!(scheduler
        .speak(&steve(), "meet at {topic} soon", Duration::ZERO, false)
        .is_none());
    assert!(scheduler
        .speak(&steve(), "whats the topic tonight", Duration::ZERO, false)
        .is_none());
    assert!(deliveries.try_recv().is_err());
}

#[test]
fn test_limiter_gates_non_priority_lines() {
    let mut config = quiet_config();
    config.limiter.enabled = true;
    let (engine, mut deliveries) =
        engine_with(config, vec![steve(), alex()], FixedGenerator::new(""));
    let scheduler = engine.scheduler();

    assert!(scheduler
        .speak(&steve(), "who wants to farm wheat", Duration::ZERO, false)
        .is_some());
    // global cooldown
    assert!(scheduler
        .speak(&alex(), "the nether is calm today", Duration::ZERO, false)
        .is_none());
    // priority bypasses the global gap
    assert!(scheduler
        .speak(&alex(), "the nether is calm today", Duration::ZERO, true)
        .is_some());
    assert_eq!(deliveries.try_recv().unwrap().agent_id, "a1");
    assert_eq!(deliveries.try_recv().unwrap().agent_id, "a2");
}

#[tokio::test]
async fn test_line_enters_recent_history_on_delivery() {
    let mut config = quiet_config();
    config.templates.idle_phrases = Localized::default();
    let (engine, mut deliveries) = engine_with(config, vec![steve()], FixedGenerator::new(""));

    let pending = engine
        .scheduler()
        .speak(&steve(), "selling iron blocks cheap", Duration::from_millis(200), false)
        .unwrap();
    assert!(pending.delay >= Duration::from_millis(200));
    assert!(!engine.memory().is_recently_used("selling iron blocks cheap"));

    let delivered = next_delivery(&mut deliveries).await;
    assert_eq!(delivered.text, "selling iron blocks cheap");
    assert!(engine.memory().is_recently_used("selling iron blocks cheap"));
}

#[tokio::test]
async fn test_question_is_learned_and_answered() {
    let generator = FixedGenerator::new("dig down to y 12 for diamonds\nsecond line");
    let (engine, mut deliveries) = engine_with(quiet_config(), vec![steve()], generator.clone());

    let inbound = engine.handle_user_message("alice", "where can i find diamonds");
    assert!(inbound.question);
    assert!(!inbound.mentioned);
    assert_eq!(
        engine.learning().pending(pulsechat::Bucket::Qa),
        vec!["where can i find diamonds"]
    );

    let delivered = next_delivery(&mut deliveries).await;
    assert_eq!(delivered.agent_id, "a1");
    assert_eq!(delivered.text, "dig down to y 12 for diamonds");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mentioned_question_answered_by_that_agent() {
    let generator = FixedGenerator::new("check the cave near spawn");
    let (engine, mut deliveries) =
        engine_with(quiet_config(), vec![steve(), alex()], generator);

    let inbound = engine.handle_user_message("alice", "@Alex where is the iron");
    assert!(inbound.question && inbound.mentioned);

    let delivered = next_delivery(&mut deliveries).await;
    assert_eq!(delivered.agent_id, "a2");
    assert_eq!(delivered.line, "Alex: check the cave near spawn");
}

#[tokio::test]
async fn test_mentioned_unknown_agent_stays_silent() {
    let generator = FixedGenerator::new("check the cave near spawn");
    let (engine, _deliveries) = engine_with(quiet_config(), vec![steve()], generator.clone());

    let scheduled = engine
        .scheduler()
        .reactive_reply("bob where is the iron", "alice", true)
        .await;
    assert!(scheduled.is_empty());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_answer_falls_back_to_learned_phrase() {
    let (engine, mut deliveries) = engine_with(quiet_config(), vec![steve()], FixedGenerator::new(""));
    engine.learning().store(pulsechat::Bucket::Qa).add("try the village blacksmith");

    let scheduled = engine
        .scheduler()
        .reactive_reply("where is the iron", "alice", false)
        .await;
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].text, "try the village blacksmith");
    assert!(scheduled[0].delay >= Duration::from_millis(1_000));
    assert_eq!(next_delivery(&mut deliveries).await.text, "try the village blacksmith");
}

#[tokio::test]
async fn test_strict_mode_skips_fallbacks() {
    let mut config = quiet_config();
    config.dialogue.strict_ai = true;
    let (engine, _deliveries) = engine_with(config, vec![steve()], FixedGenerator::new(""));
    engine.learning().store(pulsechat::Bucket::Qa).add("try the village blacksmith");

    let scheduled = engine
        .scheduler()
        .reactive_reply("where is the iron", "alice", false)
        .await;
    assert!(scheduled.is_empty());
}

#[tokio::test]
async fn test_group_scene_staggers_speakers() {
    let mut config = quiet_config();
    config.dialogue.group_chance = 1.0;
    config.dialogue.group_participation_ratio = 1.0;
    let (engine, _deliveries) = engine_with(config, vec![steve(), alex()], FixedGenerator::new(""));

    let scheduled = engine.scheduler().group_scene().await;
    assert!(!scheduled.is_empty());
    assert!(scheduled.windows(2).all(|pair| pair[0].delay < pair[1].delay));
    assert!(scheduled
        .iter()
        .all(|pending| pending.agent_id == "a1" || pending.agent_id == "a2"));
}

#[tokio::test]
async fn test_mention_scene_addresses_target_once_per_interval() {
    let mut config = quiet_config();
    config.dialogue.mention_enabled = true;
    config.dialogue.mention_chance = 1.0;
    config.dialogue.mention_use_ai = false;
    let (engine, _deliveries) = engine_with(config, vec![steve(), alex()], FixedGenerator::new(""));
    let scheduler = engine.scheduler();

    assert!(scheduler.mention_scene(true).await.is_empty());

    let scheduled = scheduler.mention_scene(false).await;
    assert!(!scheduled.is_empty());
    let lead = &scheduled[0];
    let target = if lead.agent_id == "a1" { "@Alex" } else { "@Steve" };
    assert!(lead.text.contains(target), "lead was {:?}", lead.text);

    assert!(scheduler.mention_scene(false).await.is_empty());
}

#[tokio::test]
async fn test_idle_scene_uses_idle_pool() {
    let mut config = quiet_config();
    config.dialogue.idle_chance = 1.0;
    config.templates.idle_phrases = Localized {
        en: vec!["anyone up for a nether run".to_string()],
        zh: Vec::new(),
    };
    let (engine, mut deliveries) = engine_with(config, vec![steve()], FixedGenerator::new(""));

    let scheduled = engine.scheduler().idle_scene().await;
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].text, "anyone up for a nether run");
    assert_eq!(next_delivery(&mut deliveries).await.agent_name, "Steve");
}

#[test]
fn test_scenes_need_a_runtime() {
    let (engine, _deliveries) = engine_with(quiet_config(), vec![steve()], FixedGenerator::new(""));
    assert!(engine.run_idle_tick().is_none());
    assert!(engine.trigger_reactive_reply("where is iron", "alice", false).is_none());
}
