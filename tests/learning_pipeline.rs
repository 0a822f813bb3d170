//! End-to-end learning pipeline tests.
//!
//! These drive capture, batching, refinement and fallback through the public
//! API with scripted generators instead of a network service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulsechat::gateway::GenerateFuture;
use pulsechat::{
    BatchOutcome, Bucket, ChannelStatus, Config, LearningPipeline, LearningStores,
    OfflineGenerator, ProfileKind, TextGenerator,
};

/// Lowest `max_refined_size` that survives normalization
const SMALLEST_STORE: usize = 200;

/// Answers with queued replies (empty once exhausted) after `delay`.
struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(replies: &[&str], delay: Duration) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str, _kind: ProfileKind) -> GenerateFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.replies.lock().unwrap().pop_front().unwrap_or_default()
        })
    }

    fn channel_status(&self, _kind: ProfileKind) -> ChannelStatus {
        ChannelStatus::Ready
    }
}

fn pipeline_with(config: Config, generator: Arc<dyn TextGenerator>) -> Arc<LearningPipeline> {
    let config = Arc::new(config.normalized());
    let stores = LearningStores::in_memory(&config);
    Arc::new(LearningPipeline::new(config, generator, stores))
}

fn capture_all(pipeline: &LearningPipeline, lines: &[&str], priority: bool) {
    for (i, line) in lines.iter().enumerate() {
        assert!(
            pipeline
                .capture_at(&format!("user{i}"), line, priority, 1_000_000)
                .is_some(),
            "not captured: {line}"
        );
    }
}

/// Questions go to the head of QA, other lines to the tail of GENERAL
#[test]
fn test_capture_routes_by_priority() {
    let pipeline = pipeline_with(Config::default(), Arc::new(OfflineGenerator));

    assert_eq!(
        pipeline.capture_at("alex", "where is the end portal", true, 0),
        Some(Bucket::Qa)
    );
    assert_eq!(
        pipeline.capture_at("steve", "how do i get to the nether fortress", true, 0),
        Some(Bucket::Qa)
    );
    assert_eq!(
        pipeline.capture_at("bob", "selling iron blocks cheap", false, 0),
        Some(Bucket::General)
    );
    assert_eq!(
        pipeline.capture_at("carol", "anyone farming tonight", false, 0),
        Some(Bucket::General)
    );

    assert_eq!(
        pipeline.pending(Bucket::Qa),
        vec!["how do i get to the nether fortress", "where is the end portal"]
    );
    assert_eq!(
        pipeline.pending(Bucket::General),
        vec!["selling iron blocks cheap", "anyone farming tonight"]
    );
    assert_eq!(pipeline.status().raw_count, 4);
}

/// Escapes, NULs and color codes never reach the queue
#[test]
fn test_capture_strips_control_content() {
    let pipeline = pipeline_with(Config::default(), Arc::new(OfflineGenerator));

    assert_eq!(
        pipeline.capture_at("alex", "anyone \u{1b}[31mfarming\u{0} tonight", false, 0),
        Some(Bucket::General)
    );
    assert_eq!(
        pipeline.capture_at("steve", "§6selling\r\niron blocks cheap", false, 0),
        Some(Bucket::General)
    );

    let pending = pipeline.pending(Bucket::General);
    assert_eq!(pending, vec!["anyone farming tonight", "selling iron blocks cheap"]);
    assert!(pending.iter().all(|line| !line.chars().any(char::is_control)));
}

/// Without a usable channel, batches are requeued until the failure streak
/// forces one verbatim import
#[tokio::test]
async fn test_repeated_failures_force_one_import() {
    let mut config = Config::default();
    config.learning.allow_raw_fallback = false;
    config.learning.force_fallback_after_failures = 5;
    let pipeline = pipeline_with(config, Arc::new(OfflineGenerator));
    capture_all(
        &pipeline,
        &["anyone farming tonight", "selling iron blocks cheap", "need help at the nether portal"],
        false,
    );

    for streak in 1..=5 {
        assert_eq!(
            pipeline.run_once(Bucket::General, true).await,
            BatchOutcome::Requeued
        );
        assert_eq!(pipeline.failure_streak(Bucket::General), streak);
        assert_eq!(pipeline.pending(Bucket::General).len(), 3);
    }

    assert_eq!(
        pipeline.run_once(Bucket::General, true).await,
        BatchOutcome::FallbackImported(3)
    );
    assert_eq!(pipeline.failure_streak(Bucket::General), 0);
    assert!(pipeline.pending(Bucket::General).is_empty());
    assert!(pipeline.store(Bucket::General).contains("anyone farming tonight"));
    assert!(!pipeline.is_in_flight(Bucket::General));
}

/// Opt-in raw fallback imports on the first failure
#[tokio::test]
async fn test_allow_raw_fallback_imports_immediately() {
    let mut config = Config::default();
    config.learning.allow_raw_fallback = true;
    let pipeline = pipeline_with(config, Arc::new(OfflineGenerator));
    capture_all(&pipeline, &["anyone farming tonight", "selling iron blocks cheap"], false);

    assert_eq!(
        pipeline.run_once(Bucket::General, true).await,
        BatchOutcome::FallbackImported(2)
    );
    assert_eq!(pipeline.store(Bucket::General).len(), 2);
}

/// Refined lines are committed; copies of sources and low-signal lines are not
#[tokio::test]
async fn test_refinement_commits_clean_lines() {
    let generator = Arc::new(ScriptedGenerator::new(
        &["1. meet me by the north gate\n2. anyone farming tonight\n- ok\n- bring torches for the mine"],
        Duration::ZERO,
    ));
    let pipeline = pipeline_with(Config::default(), generator.clone());
    capture_all(
        &pipeline,
        &["anyone farming tonight", "selling iron blocks cheap", "need help at the nether portal"],
        false,
    );

    assert_eq!(
        pipeline.run_once(Bucket::General, true).await,
        BatchOutcome::Committed(2)
    );
    assert_eq!(
        pipeline.store(Bucket::General).all(),
        vec!["meet me by the north gate", "bring torches for the mine"]
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert!(pipeline.pending(Bucket::General).is_empty());
}

/// An unusable first reply is retried once, then the batch is requeued
#[tokio::test]
async fn test_unusable_replies_requeue_batch() {
    let generator = Arc::new(ScriptedGenerator::new(&["", "anyone farming tonight"], Duration::ZERO));
    let pipeline = pipeline_with(Config::default(), generator.clone());
    capture_all(&pipeline, &["anyone farming tonight", "selling iron blocks cheap"], false);

    assert_eq!(
        pipeline.run_once(Bucket::General, true).await,
        BatchOutcome::Requeued
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.failure_streak(Bucket::General), 1);
    assert_eq!(pipeline.pending(Bucket::General).len(), 2);
}

/// A second trigger while a refinement runs is a no-op
#[tokio::test]
async fn test_single_refinement_in_flight() {
    let generator = Arc::new(ScriptedGenerator::new(
        &["meet me by the north gate"],
        Duration::from_millis(200),
    ));
    let pipeline = pipeline_with(Config::default(), generator.clone());
    capture_all(&pipeline, &["anyone farming tonight", "selling iron blocks cheap"], false);

    assert!(pipeline.trigger(Bucket::General, true));
    assert!(pipeline.is_in_flight(Bucket::General));
    assert!(!pipeline.trigger(Bucket::General, true));
    assert_eq!(
        pipeline.run_once(Bucket::General, true).await,
        BatchOutcome::NotReady
    );
    // The other bucket is independent
    assert!(!pipeline.is_in_flight(Bucket::Qa));

    for _ in 0..100 {
        if !pipeline.is_in_flight(Bucket::General) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!pipeline.is_in_flight(Bucket::General));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert!(pipeline.store(Bucket::General).contains("meet me by the north gate"));
}

/// A commit into a full store evicts the oldest phrases
#[tokio::test]
async fn test_commit_keeps_store_within_capacity() {
    let generator = Arc::new(ScriptedGenerator::new(
        &["meet me by the north gate\nbring torches for the mine"],
        Duration::ZERO,
    ));
    let mut config = Config::default();
    config.learning.max_refined_size = SMALLEST_STORE;
    let pipeline = pipeline_with(config, generator);
    let max = SMALLEST_STORE;

    let filler: Vec<String> = (0..max).map(|i| format!("stored line number {i}")).collect();
    pipeline.store(Bucket::General).extend(&filler);
    assert_eq!(pipeline.store(Bucket::General).len(), max);
    capture_all(&pipeline, &["anyone farming tonight", "selling iron blocks cheap"], false);

    assert_eq!(
        pipeline.run_once(Bucket::General, true).await,
        BatchOutcome::Committed(2)
    );
    let store = pipeline.store(Bucket::General);
    assert!(store.len() <= max);
    assert!(store.contains("bring torches for the mine"));
    assert!(!store.contains("stored line number 0"));
    assert!(!store.contains("stored line number 1"));
    assert!(store.contains("stored line number 2"));
}

/// Concurrent triggers start exactly one refinement
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_start_one_refinement() {
    let generator = Arc::new(ScriptedGenerator::new(
        &["meet me by the north gate"],
        Duration::from_millis(200),
    ));
    let pipeline = pipeline_with(Config::default(), generator.clone());
    capture_all(&pipeline, &["anyone farming tonight", "selling iron blocks cheap"], false);

    let barrier = Arc::new(tokio::sync::Barrier::new(8));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                pipeline.trigger(Bucket::General, true)
            })
        })
        .collect();
    let mut started = 0;
    for task in tasks {
        if task.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    for _ in 0..100 {
        if !pipeline.is_in_flight(Bucket::General) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!pipeline.is_in_flight(Bucket::General));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.store(Bucket::General).all(), vec!["meet me by the north gate"]);
}

/// Stores written under a data directory survive a reopen
#[tokio::test]
async fn test_stores_persist_to_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.learning.allow_raw_fallback = true;
    let config = Arc::new(config.normalized());

    let pipeline = LearningPipeline::new(
        Arc::clone(&config),
        Arc::new(OfflineGenerator),
        LearningStores::open_dir(dir.path(), &config),
    );
    pipeline.capture_at("steve", "anyone farming tonight", false, 0);
    pipeline.capture_at("alex", "selling iron blocks cheap", false, 0);
    assert!(pipeline.run_once(Bucket::General, true).await.made_progress());
    pipeline.store(Bucket::General).persist_now().unwrap();

    let reopened = LearningStores::open_dir(dir.path(), &config);
    assert_eq!(
        reopened.general.all(),
        vec!["anyone farming tonight", "selling iron blocks cheap"]
    );
    assert!(reopened.qa.is_empty());
    assert!(dir.path().join("learned-phrases.json").exists());
}

/// Status reflects both lanes
#[test]
fn test_status_counts() {
    let pipeline = pipeline_with(Config::default(), Arc::new(OfflineGenerator));
    pipeline.capture_at("alex", "where is the end portal", true, 0);
    pipeline.capture_at("bob", "selling iron blocks cheap", false, 0);
    let status = pipeline.status();
    assert_eq!(status.pending_count, 2);
    assert_eq!(status.refined_count, 0);
    assert_eq!(status.buckets.len(), 2);
    assert!(status.buckets.iter().all(|b| b.failure_streak == 0 && !b.in_flight));
}
