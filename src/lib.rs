//! # PulseChat - Simulated Chat Participants
//!
//! Decides what simulated agents say in a shared chat, when they may say it,
//! and grows their phrase vocabulary from what real users write.
//!
//! ## Features
//!
//! - **Phrase learning**: observed lines are queued per bucket, batched and
//!   refined through a text-generation service into reusable short phrases
//! - **Anti-repetition**: bigram Dice similarity against recent history and
//!   against what each present observer has already seen
//! - **Layered rate limiting**: global, per-agent, per-topic and burst-window
//!   cooldowns with a priority path for direct replies
//! - **Human pacing**: every line is delivered after a simulated typing delay
//!
//! ## Architecture
//!
//! ```text
//! observed text ──> LearningPipeline ──> Gateway (refine) ──> PhraseStore
//!
//! tick ──> DialogueScheduler ──> Composer ──> similarity checks
//!                                               │
//!                                               v
//!                                          RateLimiter ──> typing delay ──> DeliverySink
//!                                                                 │
//!                                               DialogueMemory <──┘
//! ```
//!
//! ### Learning Buckets
//!
//! | Bucket    | Fed by                  | Used for                         |
//! |-----------|-------------------------|----------------------------------|
//! | `QA`      | question-like lines     | question replies, follow-ups     |
//! | `GENERAL` | everything else         | idle chat, dialogue fallbacks    |
//!
//! ### Rate Limiter Scopes
//!
//! | Scope  | Cooldown                         | Priority sends            |
//! |--------|----------------------------------|---------------------------|
//! | burst  | N sends per rolling window       | bypass                    |
//! | global | fixed                            | bypass, half gap recorded |
//! | agent  | random in `[min, max]`           | bypass, shortened         |
//! | topic  | fixed per topic word             | enforced                  |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pulsechat::{Agent, ChannelSink, Config, Engine, Language, StaticDirectory};
//!
//! let agents = Arc::new(StaticDirectory::new(vec![
//!     Agent::new("a1", "Steve", Language::En),
//!     Agent::new("a2", "Alex", Language::En),
//! ]));
//! let (sink, mut deliveries) = ChannelSink::new();
//! let engine = Engine::builder()
//!     .config(Config::from_env())
//!     .agents(agents)
//!     .sink(Arc::new(sink))
//!     .build()?;
//! let _tasks = engine.spawn_periodic();
//!
//! engine.handle_user_message("alice", "where do you find iron?");
//! while let Some(delivery) = deliveries.recv().await {
//!     println!("{}", delivery.line);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`text`]: similarity, language classification and content filters
//! - [`limiter`]: layered rate limiter
//! - [`gateway`]: text-generation client
//! - [`store`]: persisted phrase sets
//! - [`learning`]: capture, batching and refinement
//! - [`dialogue`]: composer, memory and scene scheduler
//! - [`agents`]: collaborator traits and simple implementations
//! - [`engine`]: public façade and periodic tasks
//! - [`config`]: configuration management
//! - [`error`]: error types and result aliases

pub mod agents;
pub mod config;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod learning;
pub mod limiter;
pub mod store;
pub mod text;

// Re-exports for convenience
pub use agents::{
    format_chat_line, Agent, AgentDirectory, AudienceDirectory, ChannelSink, Delivery,
    DeliverySink, LogSink, NoPrefix, PrefixProvider, StaticAudience, StaticDirectory,
};
pub use config::Config;
pub use dialogue::{Composer, DialogueMemory, DialogueScheduler, PendingMessage};
pub use engine::{is_question_like, Engine, EngineBuilder, Inbound, PeriodicTasks};
pub use error::{PulseError, Result};
pub use gateway::{ChannelStatus, Gateway, OfflineGenerator, ProfileKind, TextGenerator};
pub use learning::{BatchOutcome, Bucket, LearningPipeline, LearningStatus, LearningStores};
pub use limiter::{Decision, DenyReason, RateLimiter, ScopeSet};
pub use store::{JsonFileStore, KeySetStore, PhraseStore, RawArchive};
pub use text::{is_similar, normalize, similarity, Language};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
