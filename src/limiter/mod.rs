//! Layered send-rate limiting.
//!
//! Each send reserves a slot against four scopes, checked in order:
//!
//! | Scope  | Key                     | Priority sends     |
//! |--------|-------------------------|--------------------|
//! | burst  | rolling window count    | bypass             |
//! | global | single timestamp        | bypass             |
//! | agent  | lowercase agent id      | bypass             |
//! | topic  | extracted topic word    | still enforced     |
//!
//! A granted reservation advances every scope's clock, priority or not, so a
//! priority send still pushes back the next ordinary line from that agent.
//!
//! Before any of that, non-priority sends are suppressed when fewer than
//! `min_present_observers` real users are present.

mod expiry;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub use expiry::ExpiryMap;

use crate::config::LimiterConfig;
use crate::text::{extract_topic_word, normalize_topic_key};

/// Minimum global gap after a priority send.
const PRIORITY_GLOBAL_FLOOR_MS: u64 = 1_000;
/// Minimum agent cooldown after a priority send.
const PRIORITY_AGENT_FLOOR_SECS: u64 = 2;

/// Current unix time in milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The scopes one send is charged against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet {
    /// Agent scope key
    pub agent: Option<String>,
    /// Topic scope key
    pub topic: Option<String>,
}

impl ScopeSet {
    /// Scopes for `agent_id` saying `text`.
    pub fn for_message(agent_id: &str, text: &str) -> Self {
        let agent = agent_id.trim().to_lowercase();
        let topic = normalize_topic_key(&extract_topic_word(text));
        Self {
            agent: (!agent.is_empty()).then_some(agent),
            topic: (!topic.is_empty()).then_some(topic),
        }
    }
}

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Too few real users present
    Population,
    /// Burst window is full
    Burst,
    /// Global cooldown running
    Global,
    /// Agent cooldown running
    Agent,
    /// Topic cooldown running
    Topic,
}

/// Outcome of [`RateLimiter::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Slot reserved; every scope clock was advanced
    Granted,
    /// Nothing changed
    Denied(DenyReason),
}

impl Decision {
    /// True for [`Decision::Granted`]
    pub fn is_granted(self) -> bool {
        matches!(self, Decision::Granted)
    }
}

#[derive(Debug)]
struct LimiterState {
    global_next: u64,
    timeline: VecDeque<u64>,
    agents: ExpiryMap,
    topics: ExpiryMap,
    rng: StdRng,
}

/// Thread-safe rate limiter. Owns all of its timestamp maps.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter with an entropy-seeded cooldown RNG
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a limiter with a fixed seed
    pub fn with_seed(config: LimiterConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: LimiterConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                global_next: 0,
                timeline: VecDeque::new(),
                agents: ExpiryMap::new(),
                topics: ExpiryMap::new(),
                rng,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a send slot now.
    pub fn reserve(&self, scopes: &ScopeSet, priority: bool, present_observers: usize) -> Decision {
        self.reserve_at(scopes, priority, present_observers, now_ms())
    }

    /// Reserve a send slot at `now` (unix ms).
    pub fn reserve_at(
        &self,
        scopes: &ScopeSet,
        priority: bool,
        present_observers: usize,
        now: u64,
    ) -> Decision {
        let config = &self.config;
        if !config.enabled {
            return Decision::Granted;
        }
        if !priority
            && config.require_observers
            && present_observers < config.min_present_observers
        {
            return Decision::Denied(DenyReason::Population);
        }

        let burst_window_ms = config.burst_window_secs * 1000;
        let mut state = self.lock();
        Self::prune(&mut state, config, now);
        while state
            .timeline
            .front()
            .is_some_and(|sent| now.saturating_sub(*sent) > burst_window_ms)
        {
            state.timeline.pop_front();
        }

        if !priority && state.timeline.len() >= config.burst_max_lines {
            return Decision::Denied(DenyReason::Burst);
        }
        if !priority && now < state.global_next {
            return Decision::Denied(DenyReason::Global);
        }
        if let Some(agent) = &scopes.agent {
            if !priority && state.agents.is_blocked(agent, now) {
                return Decision::Denied(DenyReason::Agent);
            }
        }
        if let Some(topic) = &scopes.topic {
            if config.topic_cooldown_secs > 0 && state.topics.is_blocked(topic, now) {
                return Decision::Denied(DenyReason::Topic);
            }
        }

        let global_ms = config.global_cooldown_secs * 1000;
        let effective_global = if priority {
            (global_ms / 2).max(PRIORITY_GLOBAL_FLOOR_MS)
        } else {
            global_ms
        };
        if effective_global > 0 {
            state.global_next = now + effective_global;
        }
        state.timeline.push_back(now);

        if let Some(agent) = &scopes.agent {
            let (low, high) = (
                config.agent_cooldown_min_secs.min(config.agent_cooldown_max_secs),
                config.agent_cooldown_min_secs.max(config.agent_cooldown_max_secs),
            );
            let mut secs = state.rng.gen_range(low..=high);
            if priority {
                secs = ((secs as f64 * config.priority_agent_factor).round() as u64)
                    .max(PRIORITY_AGENT_FLOOR_SECS);
            }
            state.agents.set(agent, now + secs * 1000);
        }
        if let Some(topic) = &scopes.topic {
            if config.topic_cooldown_secs > 0 {
                state.topics.set(topic, now + config.topic_cooldown_secs * 1000);
            }
        }
        Decision::Granted
    }

    fn prune(state: &mut LimiterState, config: &LimiterConfig, now: u64) {
        let stale_after_ms = config.stale_after_secs * 1000;
        state.topics.prune_stale(now, stale_after_ms);
        state.agents.prune_stale(now, stale_after_ms);
        state.topics.trim_by_earliest(config.topic_cache_max);
        state.agents.trim_by_earliest(config.agent_cache_max);
    }

    /// Next allowed instant for an agent, `0` when unknown
    pub fn agent_next_allowed(&self, agent_id: &str) -> u64 {
        self.lock().agents.get(&agent_id.trim().to_lowercase())
    }

    /// Tracked (agents, topics)
    pub fn tracked(&self) -> (usize, usize) {
        let state = self.lock();
        (state.agents.len(), state.topics.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::with_seed(LimiterConfig::default(), 7)
    }

    const T0: u64 = 1_000_000_000;

    #[test]
    fn test_scope_set_for_message() {
        let scopes = ScopeSet::for_message("Alex", "lets farm iron");
        assert_eq!(scopes.agent.as_deref(), Some("alex"));
        assert_eq!(scopes.topic.as_deref(), Some("farm"));

        let bare = ScopeSet::for_message("", "ok");
        assert_eq!(bare, ScopeSet::default());
    }

    #[test]
    fn test_inverted_agent_bounds_are_ordered() {
        let config = LimiterConfig {
            agent_cooldown_min_secs: 30,
            agent_cooldown_max_secs: 10,
            ..LimiterConfig::default()
        };
        let limiter = RateLimiter::with_seed(config, 3);
        let scopes = ScopeSet::for_message("a", "iron run");
        assert!(limiter.reserve_at(&scopes, false, 5, T0).is_granted());
        let next = limiter.agent_next_allowed("a");
        assert!((T0 + 10_000..=T0 + 30_000).contains(&next), "{next}");
    }

    #[test]
    fn test_global_cooldown_blocks_next_send() {
        let limiter = limiter();
        let a = ScopeSet::for_message("a", "iron run");
        let b = ScopeSet::for_message("b", "boss fight");
        assert!(limiter.reserve_at(&a, false, 1, T0).is_granted());
        assert_eq!(
            limiter.reserve_at(&b, false, 1, T0 + 1_000),
            Decision::Denied(DenyReason::Global)
        );
        assert!(limiter.reserve_at(&b, false, 1, T0 + 4_000).is_granted());
    }

    #[test]
    fn test_agent_cooldown_window() {
        let limiter = limiter();
        let first = ScopeSet::for_message("steve", "iron run");
        assert!(limiter.reserve_at(&first, false, 1, T0).is_granted());
        let next = limiter.agent_next_allowed("Steve");
        assert!(next >= T0 + 20_000 && next <= T0 + 75_000);

        let again = ScopeSet::for_message("steve", "boss fight");
        assert_eq!(
            limiter.reserve_at(&again, false, 1, T0 + 10_000),
            Decision::Denied(DenyReason::Agent)
        );
        assert!(limiter.reserve_at(&again, false, 1, next).is_granted());
    }

    #[test]
    fn test_priority_bypasses_but_advances_clock() {
        let limiter = limiter();
        let scopes = ScopeSet::for_message("steve", "iron run");
        assert!(limiter.reserve_at(&scopes, false, 5, T0).is_granted());

        let reply = ScopeSet::for_message("steve", "dungeon now");
        assert!(limiter.reserve_at(&reply, true, 1, T0 + 100).is_granted());
        let next = limiter.agent_next_allowed("steve");
        // 0.6 of 20..=75 seconds, measured from the priority send
        assert!(next >= T0 + 100 + 12_000 && next <= T0 + 100 + 45_000);
    }

    #[test]
    fn test_topic_enforced_for_priority() {
        let limiter = limiter();
        assert!(limiter
            .reserve_at(&ScopeSet::for_message("a", "iron farm"), false, 1, T0)
            .is_granted());
        assert_eq!(
            limiter.reserve_at(&ScopeSet::for_message("b", "iron again"), true, 1, T0 + 5_000),
            Decision::Denied(DenyReason::Topic)
        );
    }

    #[test]
    fn test_burst_window() {
        let mut config = LimiterConfig::default();
        config.global_cooldown_secs = 0;
        config.burst_max_lines = 2;
        let limiter = RateLimiter::with_seed(config, 1);

        let words = ["iron", "boss", "farm", "gear"];
        assert!(limiter
            .reserve_at(&ScopeSet::for_message("a", words[0]), false, 1, T0)
            .is_granted());
        assert!(limiter
            .reserve_at(&ScopeSet::for_message("b", words[1]), false, 1, T0 + 10)
            .is_granted());
        assert_eq!(
            limiter.reserve_at(&ScopeSet::for_message("c", words[2]), false, 1, T0 + 20),
            Decision::Denied(DenyReason::Burst)
        );
        assert!(limiter
            .reserve_at(&ScopeSet::for_message("c", words[3]), false, 1, T0 + 31_000)
            .is_granted());
    }

    #[test]
    fn test_population_suppression() {
        let limiter = limiter();
        let scopes = ScopeSet::for_message("a", "iron run");
        assert_eq!(
            limiter.reserve_at(&scopes, false, 0, T0),
            Decision::Denied(DenyReason::Population)
        );
        assert!(limiter.reserve_at(&scopes, true, 0, T0).is_granted());
    }

    #[test]
    fn test_stale_scopes_pruned() {
        let limiter = limiter();
        assert!(limiter
            .reserve_at(&ScopeSet::for_message("a", "iron run"), false, 1, T0)
            .is_granted());
        assert_eq!(limiter.tracked(), (1, 1));
        let later = T0 + 10_000_000;
        assert!(limiter
            .reserve_at(&ScopeSet::for_message("b", "boss fight"), false, 1, later)
            .is_granted());
        assert_eq!(limiter.tracked(), (1, 1));
    }
}
