//! The learning pipeline: capture, batch, refine, commit.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::filter::{filter_batch, is_learning_candidate, sanitize_raw};
use super::prompt::{summary_prompt, summary_retry_prompt};
use super::queue::LearningQueue;
use super::refine::{parse_refined, RefineContext};
use super::{Bucket, BucketStatus, LearningStatus};
use crate::config::Config;
use crate::gateway::{ProfileKind, TextGenerator};
use crate::limiter::{now_ms, ExpiryMap};
use crate::store::{JsonFileStore, PhraseStore, RawArchive};
use crate::text::normalize;

/// Throttle entries this long past expiry are dropped when the map is full.
const THROTTLE_GRACE_MS: u64 = 60_000;

/// The stores a pipeline commits to.
#[derive(Debug, Clone)]
pub struct LearningStores {
    /// Refined `QA` phrases
    pub qa: PhraseStore,
    /// Refined `GENERAL` phrases
    pub general: PhraseStore,
    /// Raw capture archive
    pub raw: RawArchive,
}

impl LearningStores {
    /// In-memory stores
    pub fn in_memory(config: &Config) -> Self {
        Self {
            qa: PhraseStore::in_memory("qa"),
            general: PhraseStore::in_memory("general"),
            raw: RawArchive::in_memory(config.learning.raw_max_size),
        }
    }

    /// JSON-file stores under `dir`
    pub fn open_dir(dir: &Path, config: &Config) -> Self {
        Self {
            qa: PhraseStore::open("qa", Arc::new(JsonFileStore::new(dir.join("learned-qa.json")))),
            general: PhraseStore::open(
                "general",
                Arc::new(JsonFileStore::new(dir.join("learned-phrases.json"))),
            ),
            raw: RawArchive::open(
                Arc::new(JsonFileStore::new(dir.join("learned-raw.json"))),
                config.learning.raw_max_size,
            ),
        }
    }
}

/// What one batch attempt ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Trigger conditions not met, or a refinement is already running
    NotReady,
    /// Nothing survived the batch filter
    Discarded,
    /// Batch put back for a later attempt
    Requeued,
    /// Batch imported verbatim (opt-in or forced after repeated failures)
    FallbackImported(usize),
    /// Refined phrases committed
    Committed(usize),
}

impl BatchOutcome {
    /// True when the attempt made forward progress.
    pub fn made_progress(self) -> bool {
        matches!(self, BatchOutcome::FallbackImported(_) | BatchOutcome::Committed(_))
    }
}

#[derive(Debug, Default)]
struct LaneState {
    last_refined_at: u64,
    failure_streak: u32,
    last_warning_at: Option<u64>,
}

/// One bucket's queue, store and bookkeeping.
#[derive(Debug)]
struct Lane {
    bucket: Bucket,
    queue: Mutex<LearningQueue>,
    store: PhraseStore,
    state: Mutex<LaneState>,
    in_flight: AtomicBool,
}

impl Lane {
    fn queue(&self) -> MutexGuard<'_, LearningQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a lane's single in-flight slot; releases it on drop unless kept.
struct Slot<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl<'a> Slot<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, armed: true })
    }

    /// Take over a slot kept by an earlier [`Slot::keep`].
    fn adopt(flag: &'a AtomicBool) -> Self {
        Self { flag, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::Release);
        }
    }
}

enum Begin {
    NotReady,
    Done(BatchOutcome),
    Refine(Vec<String>),
}

/// Capture, batching and refinement for both buckets.
///
/// Share it behind an `Arc`; [`LearningPipeline::observe`] and
/// [`LearningPipeline::trigger`] spawn refinements onto the current tokio
/// runtime.
pub struct LearningPipeline {
    config: Arc<Config>,
    generator: Arc<dyn TextGenerator>,
    lanes: [Lane; 2],
    raw: RawArchive,
    throttle: Mutex<ExpiryMap>,
}

impl std::fmt::Debug for LearningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningPipeline")
            .field("lanes", &self.lanes)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl LearningPipeline {
    /// Build a pipeline committing to `stores`.
    pub fn new(config: Arc<Config>, generator: Arc<dyn TextGenerator>, stores: LearningStores) -> Self {
        let learning = &config.learning;
        let lane = |bucket: Bucket, store: PhraseStore| Lane {
            bucket,
            queue: Mutex::new(LearningQueue::new(
                learning.pending_max_size,
                learning.queue_dedup_tail_scan,
                learning.queue_dedup_threshold,
            )),
            store,
            state: Mutex::new(LaneState::default()),
            in_flight: AtomicBool::new(false),
        };
        let lanes = [lane(Bucket::Qa, stores.qa), lane(Bucket::General, stores.general)];
        Self {
            lanes,
            raw: stores.raw,
            throttle: Mutex::new(ExpiryMap::new()),
            generator,
            config,
        }
    }

    fn lane(&self, bucket: Bucket) -> &Lane {
        &self.lanes[bucket.index()]
    }

    /// Refined phrases of `bucket`
    pub fn store(&self, bucket: Bucket) -> &PhraseStore {
        &self.lane(bucket).store
    }

    /// Raw capture archive
    pub fn raw(&self) -> &RawArchive {
        &self.raw
    }

    /// Observe a user line; priority lines go to the head of the `QA` queue.
    ///
    /// Returns true when the line was enqueued. Either way, both buckets get
    /// an opportunistic batch trigger.
    pub fn observe(self: &Arc<Self>, source: &str, text: &str, priority: bool) -> bool {
        let enqueued = self.capture_at(source, text, priority, now_ms()).is_some();
        for bucket in Bucket::ALL {
            self.trigger(bucket, false);
        }
        enqueued
    }

    /// Capture without triggering; returns the bucket the line went to.
    pub fn capture_at(&self, source: &str, text: &str, priority: bool, now: u64) -> Option<Bucket> {
        if !self.config.learning.enabled {
            return None;
        }
        let raw = sanitize_raw(text, &self.config);
        if raw.is_empty() || !is_learning_candidate(&raw, &self.config) {
            return None;
        }
        if !self.pass_throttle(source, priority, now) {
            debug!(source, "Learning capture throttled");
            return None;
        }
        self.raw.add(&raw);
        let bucket = Bucket::for_priority(priority);
        self.lane(bucket)
            .queue()
            .enqueue(&raw, priority)
            .then_some(bucket)
    }

    fn pass_throttle(&self, source: &str, priority: bool, now: u64) -> bool {
        let key = source.trim().to_lowercase();
        if key.is_empty() {
            return true;
        }
        let mut cooldown_secs = self.config.learning.per_source_cooldown_secs;
        if priority {
            cooldown_secs = (cooldown_secs as f64 * 0.5).round() as u64;
        }
        if cooldown_secs == 0 {
            return true;
        }
        let mut throttle = self.throttle.lock().unwrap_or_else(PoisonError::into_inner);
        if throttle.is_blocked(&key, now) {
            return false;
        }
        throttle.set(&key, now + cooldown_secs * 1000);
        if throttle.len() > self.config.learning.throttle_memory_size {
            throttle.prune_stale(now, THROTTLE_GRACE_MS);
        }
        true
    }

    /// Try to start a batch for `bucket`; true when a refinement was
    /// spawned or a fallback import ran.
    pub fn trigger(self: &Arc<Self>, bucket: Bucket, force: bool) -> bool {
        match self.begin(bucket, force, now_ms()) {
            Begin::NotReady => false,
            Begin::Done(outcome) => outcome.made_progress(),
            Begin::Refine(batch) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let this = Arc::clone(self);
                    handle.spawn(async move {
                        this.refine(bucket, batch).await;
                    });
                    true
                },
                Err(_) => {
                    let lane = self.lane(bucket);
                    lane.queue().requeue(&batch);
                    drop(Slot::adopt(&lane.in_flight));
                    warn!(bucket = %bucket, "No async runtime for refinement; batch requeued");
                    false
                },
            },
        }
    }

    /// Force a batch in every bucket; true when any started.
    pub fn flush_now(self: &Arc<Self>) -> bool {
        let qa = self.trigger(Bucket::Qa, true);
        let general = self.trigger(Bucket::General, true);
        qa || general
    }

    /// Run one batch for `bucket` to completion on the calling task.
    pub async fn run_once(&self, bucket: Bucket, force: bool) -> BatchOutcome {
        match self.begin(bucket, force, now_ms()) {
            Begin::NotReady => BatchOutcome::NotReady,
            Begin::Done(outcome) => outcome,
            Begin::Refine(batch) => self.refine(bucket, batch).await,
        }
    }

    fn begin(&self, bucket: Bucket, force: bool, now: u64) -> Begin {
        let learning = &self.config.learning;
        let lane = self.lane(bucket);

        let queue_len = lane.queue().len();
        let bypass_cooldown = !force && queue_len >= learning.backlog_bypass();
        if !force && !bypass_cooldown {
            let since = now.saturating_sub(lane.state().last_refined_at);
            if since < learning.cooldown_ms() {
                return Begin::NotReady;
            }
        }
        let Some(slot) = Slot::claim(&lane.in_flight) else {
            return Begin::NotReady;
        };

        let batch = {
            let mut queue = lane.queue();
            let required = if force {
                learning.batch_size.min(queue.len()).max(1)
            } else {
                learning.batch_size
            };
            if queue.len() < required {
                return Begin::NotReady;
            }
            queue.drain_front(required)
        };

        let filtered = filter_batch(&batch, &self.config);
        if filtered.is_empty() {
            return Begin::Done(BatchOutcome::Discarded);
        }
        if !force && filtered.len() < learning.min_filtered_size {
            lane.queue().requeue(&filtered);
            return Begin::Done(BatchOutcome::Requeued);
        }

        lane.state().last_refined_at = now;

        let status = self.generator.channel_status(ProfileKind::Summary);
        if learning.api_refinement_enabled && status.is_ready() {
            slot.keep();
            return Begin::Refine(filtered);
        }

        let message = if !learning.api_refinement_enabled {
            "Refinement disabled; pending queue keeps growing"
        } else {
            "Summary channel unusable; batch requeued"
        };
        Begin::Done(self.settle_failure(lane, &filtered, message, now))
    }

    async fn refine(&self, bucket: Bucket, batch: Vec<String>) -> BatchOutcome {
        let lane = self.lane(bucket);
        let _slot = Slot::adopt(&lane.in_flight);
        let learning = &self.config.learning;
        let language = self.config.chat.language;
        let threshold = learning.dominant_language_threshold;

        let mut refined = Vec::new();
        for attempt in 1..=learning.refine_max_attempts {
            let prompt = if attempt == 1 {
                summary_prompt(&batch, bucket, language, threshold)
            } else {
                summary_retry_prompt(&batch, bucket, language, threshold, attempt)
            };
            let reply = self.generator.generate(&prompt, ProfileKind::Summary).await;
            let existing_keys = self.existing_keys();
            refined = parse_refined(
                &reply,
                &RefineContext {
                    sources: &batch,
                    existing_keys: &existing_keys,
                    config: &self.config,
                },
            );
            if !refined.is_empty() {
                break;
            }
            debug!(bucket = %bucket, attempt, "Refinement reply unusable");
        }

        if refined.is_empty() {
            return self.settle_failure(lane, &batch, "Refinement returned nothing usable; batch requeued", now_ms());
        }

        let added = lane.store.extend(&refined);
        lane.store.trim_to_max(learning.max_refined_size);
        lane.state().failure_streak = 0;
        info!(
            bucket = %bucket,
            sources = batch.len(),
            committed = added,
            stored = lane.store.len(),
            "Learning batch refined"
        );
        BatchOutcome::Committed(added)
    }

    /// Requeue or fall back after an unusable channel or reply.
    fn settle_failure(&self, lane: &Lane, batch: &[String], message: &str, now: u64) -> BatchOutcome {
        let learning = &self.config.learning;
        let streak = lane.state().failure_streak;
        let forced = learning.force_fallback_after_failures > 0
            && streak >= learning.force_fallback_after_failures;

        if learning.allow_raw_fallback || forced {
            let imported = lane.store.extend(batch.iter());
            lane.store.trim_to_max(learning.max_refined_size);
            lane.state().failure_streak = 0;
            if forced && !learning.allow_raw_fallback {
                self.warn_limited(
                    lane,
                    now,
                    &format!("{streak} consecutive refinement failures; batch imported verbatim"),
                );
            }
            return BatchOutcome::FallbackImported(imported);
        }

        lane.queue().requeue(batch);
        lane.state().failure_streak = streak + 1;
        self.warn_limited(lane, now, message);
        BatchOutcome::Requeued
    }

    fn warn_limited(&self, lane: &Lane, now: u64, message: &str) {
        let interval_ms = self.config.learning.warning_interval_secs * 1000;
        {
            let mut state = lane.state();
            if state
                .last_warning_at
                .is_some_and(|at| now.saturating_sub(at) < interval_ms)
            {
                return;
            }
            state.last_warning_at = Some(now);
        }
        warn!(bucket = %lane.bucket, "{}", message);
    }

    fn existing_keys(&self) -> Vec<String> {
        self.lanes
            .iter()
            .flat_map(|lane| lane.store.all())
            .map(|phrase| normalize(&phrase))
            .filter(|key| !key.is_empty())
            .collect()
    }

    /// Queued phrases of `bucket`, head first
    pub fn pending(&self, bucket: Bucket) -> Vec<String> {
        self.lane(bucket).queue().iter().cloned().collect()
    }

    /// Consecutive failed batches of `bucket`
    pub fn failure_streak(&self, bucket: Bucket) -> u32 {
        self.lane(bucket).state().failure_streak
    }

    /// True while a refinement of `bucket` is running
    pub fn is_in_flight(&self, bucket: Bucket) -> bool {
        self.lane(bucket).in_flight.load(Ordering::Acquire)
    }

    /// Counts across the pipeline
    pub fn status(&self) -> LearningStatus {
        let buckets: Vec<BucketStatus> = self
            .lanes
            .iter()
            .map(|lane| BucketStatus {
                bucket: lane.bucket,
                pending: lane.queue().len(),
                refined: lane.store.len(),
                in_flight: lane.in_flight.load(Ordering::Acquire),
                failure_streak: lane.state().failure_streak,
            })
            .collect();
        LearningStatus {
            raw_count: self.raw.len(),
            pending_count: buckets.iter().map(|b| b.pending).sum(),
            refined_count: buckets.iter().map(|b| b.refined).sum(),
            buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::OfflineGenerator;

    fn pipeline(config: Config) -> LearningPipeline {
        let config = Arc::new(config.normalized());
        let stores = LearningStores::in_memory(&config);
        LearningPipeline::new(config, Arc::new(OfflineGenerator), stores)
    }

    #[test]
    fn test_per_source_throttle() {
        let p = pipeline(Config::default());
        let t = 1_000_000;
        assert_eq!(p.capture_at("steve", "anyone farming tonight", false, t), Some(Bucket::General));
        assert_eq!(p.capture_at("steve", "selling iron blocks cheap", false, t + 1_000), None);
        assert_eq!(
            p.capture_at("steve", "selling iron blocks cheap", false, t + 6_000),
            Some(Bucket::General)
        );
        // Priority halves the cooldown
        assert_eq!(p.capture_at("alex", "where is the end portal", true, t), Some(Bucket::Qa));
        assert_eq!(p.capture_at("alex", "how do i tame a wolf", true, t + 3_000), Some(Bucket::Qa));
        assert_eq!(p.raw().len(), 4);
    }

    #[test]
    fn test_disabled_learning_captures_nothing() {
        let mut config = Config::default();
        config.learning.enabled = false;
        let p = pipeline(config);
        assert_eq!(p.capture_at("steve", "anyone farming tonight", false, 0), None);
        assert_eq!(p.status().raw_count, 0);
    }

    #[tokio::test]
    async fn test_batch_waits_for_full_size() {
        let mut config = Config::default();
        config.learning.batch_size = 5;
        config.learning.min_filtered_size = 5;
        config.learning.cooldown_secs = 5;
        let p = pipeline(config);
        let lines = [
            "who has spare iron ingots",
            "who has spare iron ingots!",
            "Who has spare iron ingots",
            "anyone farming tonight ok",
            "need help at the nether portal",
        ];
        for (i, line) in lines.iter().enumerate() {
            p.capture_at(&format!("p{i}"), line, false, 0);
        }
        // Near-duplicates never reach the queue
        assert_eq!(p.pending(Bucket::General).len(), 3);
        assert_eq!(p.run_once(Bucket::General, false).await, BatchOutcome::NotReady);
    }

    #[tokio::test]
    async fn test_force_on_empty_queue_is_not_ready() {
        let p = pipeline(Config::default());
        assert_eq!(p.run_once(Bucket::Qa, true).await, BatchOutcome::NotReady);
        assert!(!p.is_in_flight(Bucket::Qa));
    }
}
