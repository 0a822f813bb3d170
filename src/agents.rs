//! Collaborators the core reads from and writes to.
//!
//! Presence simulation, audience tracking and chat broadcast live outside this
//! crate. The engine only sees them through these traits, injected at
//! construction time.

use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::info;

use crate::text::Language;

/// A simulated chat participant, as reported by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Stable identifier
    pub id: String,
    /// Display name, also the `@mention` handle
    pub name: String,
    /// Preferred chat language
    pub language: Language,
    /// Currently shown as online
    pub online: bool,
    /// Not in an unavailability window
    pub alive: bool,
}

impl Agent {
    /// Online and alive agent.
    pub fn new(id: impl Into<String>, name: impl Into<String>, language: Language) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            language,
            online: true,
            alive: true,
        }
    }

    /// May speak right now
    pub fn is_eligible(&self) -> bool {
        self.online && self.alive
    }
}

/// Source of the current agent population.
pub trait AgentDirectory: Send + Sync {
    /// Every known agent, eligible or not.
    fn list_agents(&self) -> Vec<Agent>;
}

/// Source of the real users currently present.
pub trait AudienceDirectory: Send + Sync {
    /// Identifiers of present real observers.
    fn present_observers(&self) -> Vec<String>;
}

/// One composed line handed off for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Speaking agent
    pub agent_id: String,
    /// Speaking agent's display name
    pub agent_name: String,
    /// Message text
    pub text: String,
    /// Fully formatted chat line
    pub line: String,
}

/// Fire-and-forget broadcast.
pub trait DeliverySink: Send + Sync {
    /// Hand off one line. Must not block.
    fn deliver(&self, delivery: Delivery);
}

/// Optional decoration shown before an agent's name.
pub trait PrefixProvider: Send + Sync {
    /// Prefix for `agent`, empty for none.
    fn prefix(&self, agent: &Agent) -> String;
}

/// Prefix provider used when no decoration source is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrefix;

impl PrefixProvider for NoPrefix {
    fn prefix(&self, _agent: &Agent) -> String {
        String::new()
    }
}

/// Fill a `{prefix}{name}: {message}` style chat format.
pub fn format_chat_line(format: &str, prefix: &str, name: &str, message: &str) -> String {
    format
        .replace("{prefix}", prefix)
        .replace("{name}", name)
        .replace("{message}", message)
}

/// Fixed, mutable agent list.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    agents: RwLock<Vec<Agent>>,
}

impl StaticDirectory {
    /// Directory over `agents`
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: RwLock::new(agents),
        }
    }

    /// Flip an agent's online flag; false when the id is unknown.
    pub fn set_online(&self, id: &str, online: bool) -> bool {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        match agents.iter_mut().find(|agent| agent.id == id) {
            Some(agent) => {
                agent.online = online;
                true
            },
            None => false,
        }
    }
}

impl AgentDirectory for StaticDirectory {
    fn list_agents(&self) -> Vec<Agent> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Fixed, mutable observer list.
#[derive(Debug, Default)]
pub struct StaticAudience {
    observers: RwLock<Vec<String>>,
}

impl StaticAudience {
    /// Audience of `observers`
    pub fn new<I, S>(observers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            observers: RwLock::new(observers.into_iter().map(Into::into).collect()),
        }
    }

    /// Add an observer if absent
    pub fn join(&self, id: &str) {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if !observers.iter().any(|o| o.eq_ignore_ascii_case(id)) {
            observers.push(id.to_string());
        }
    }

    /// Remove an observer
    pub fn leave(&self, id: &str) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !o.eq_ignore_ascii_case(id));
    }
}

impl AudienceDirectory for StaticAudience {
    fn present_observers(&self) -> Vec<String> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Forwards deliveries into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    /// Sink plus the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DeliverySink for ChannelSink {
    fn deliver(&self, delivery: Delivery) {
        // Receiver gone means shutdown
        let _ = self.tx.send(delivery);
    }
}

/// Writes deliveries to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DeliverySink for LogSink {
    fn deliver(&self, delivery: Delivery) {
        info!(agent = %delivery.agent_id, "{}", delivery.line);
    }
}
