//! Phrase learning from observed user text.
//!
//! ```text
//! observe ──> candidate checks ──> raw archive
//!                   │
//!                   v
//!             bucket queue (similarity-gated, bounded)
//!                   │  batch trigger: size + cooldown, or backlog bypass
//!                   v
//!             batch filter ──(too small)──> requeue
//!                   │
//!                   v
//!             refine via Summary profile ──(unusable)──> requeue / fallback
//!                   │
//!                   v
//!             phrase store (bounded)
//! ```
//!
//! `QA` and `GENERAL` run as two independent lanes; each admits one
//! refinement at a time.

mod filter;
mod pipeline;
mod prompt;
mod queue;
mod refine;

use serde::Serialize;

pub use filter::{filter_batch, is_learning_candidate, sanitize_learned_phrase, sanitize_raw};
pub(crate) use filter::low_signal;
pub use pipeline::{BatchOutcome, LearningPipeline, LearningStores};
pub use prompt::{summary_prompt, summary_retry_prompt};
pub use queue::LearningQueue;
pub use refine::{parse_refined, RefineContext};

/// Learning priority partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Bucket {
    /// Question threads
    #[serde(rename = "QA")]
    Qa,
    /// Everything else
    #[serde(rename = "GENERAL")]
    General,
}

impl Bucket {
    /// Both buckets, `QA` first
    pub const ALL: [Bucket; 2] = [Bucket::Qa, Bucket::General];

    /// Bucket for an observation
    pub fn for_priority(priority: bool) -> Self {
        if priority {
            Bucket::Qa
        } else {
            Bucket::General
        }
    }

    fn index(self) -> usize {
        match self {
            Bucket::Qa => 0,
            Bucket::General => 1,
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::Qa => write!(f, "QA"),
            Bucket::General => write!(f, "GENERAL"),
        }
    }
}

/// Per-bucket learning detail
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BucketStatus {
    /// Which bucket
    pub bucket: Bucket,
    /// Queued raw phrases
    pub pending: usize,
    /// Stored refined phrases
    pub refined: usize,
    /// A refinement is running
    pub in_flight: bool,
    /// Consecutive failed refinements
    pub failure_streak: u32,
}

/// Snapshot returned by [`LearningPipeline::status`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LearningStatus {
    /// Archived raw lines
    pub raw_count: usize,
    /// Queued raw phrases across buckets
    pub pending_count: usize,
    /// Stored refined phrases across buckets
    pub refined_count: usize,
    /// Per-bucket detail
    pub buckets: Vec<BucketStatus>,
}
