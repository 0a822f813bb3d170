//! What agents say and when they say it.
//!
//! - [`memory`]: recent history, audience, topic and context memory
//! - [`prompt`]: generation prompts
//! - [`composer`]: candidate lines and anti-repetition
//! - [`scheduler`]: scenes, the limiter gate and delayed delivery

pub mod composer;
pub mod memory;
pub mod prompt;
pub mod scheduler;

pub use composer::{rewrite_candidate, speaks, Composer};
pub use memory::DialogueMemory;
pub use prompt::{group_prompt, qa_prompt, single_line_prompt, PromptContext};
pub use scheduler::{find_mentioned, Courier, DialogueScheduler, PendingMessage};
