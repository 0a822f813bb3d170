//! Refinement prompts.

use std::fmt::Write as _;

use super::Bucket;
use crate::text::{Language, LanguagePreference};

/// Prompt asking the summary profile to rewrite `batch` into reusable phrases.
pub fn summary_prompt(
    batch: &[String],
    bucket: Bucket,
    chat_language: Language,
    dominant_threshold: f64,
) -> String {
    let preference = LanguagePreference::detect(batch, dominant_threshold);
    let max_lines = batch.len().clamp(3, 12);
    let min_lines = max_lines.clamp(3, 6);

    let mut prompt = String::new();
    match bucket {
        Bucket::Qa => {
            prompt.push_str("You are refining game server Q&A dialogue style.\n");
            prompt.push_str(
                "Task: rewrite player lines into concise reply-like phrases used in question threads.\n",
            );
        },
        Bucket::General => {
            prompt.push_str("You are refining game server chat style.\n");
            prompt.push_str("Task: rewrite player lines into reusable short in-game phrases.\n");
        },
    }
    prompt.push_str(match preference {
        LanguagePreference::EnOnly => "Use English only.\n",
        LanguagePreference::ZhOnly => "Use Simplified Chinese only.\n",
        LanguagePreference::Mixed => "Keep each line in the same language style as the input line.\n",
    });
    let _ = writeln!(prompt, "Output {min_lines}-{max_lines} lines.");
    prompt.push_str("Hard rules:\n");
    prompt.push_str("- One phrase per line, no bullets, no numbering, no explanation.\n");
    prompt.push_str("- Rewrite ONLY from the provided input lines; do not invent new topics.\n");
    prompt.push_str("- Do NOT copy any input line verbatim.\n");
    prompt.push_str("- Rewrite with clearly different wording and sentence pattern.\n");
    prompt.push_str("- Preserve a natural player-chat tone.\n");
    prompt.push_str("- Remove all @player mentions and IDs.\n");
    prompt.push_str("- Keep lexical overlap with any input line low (prefer < 50%).\n");
    prompt.push_str("- Do not output meme spam or single-number replies.\n");
    prompt.push_str("- Keep concise (prefer <=16 chars for zh or <=10 words for en).\n");
    if bucket == Bucket::Qa {
        prompt.push_str("- Prefer answer-like tone (brief advice, route, steps, fix).\n");
    }
    if chat_language == Language::Zh {
        prompt.push_str("- In Chinese mode, avoid pure-English lines.\n");
    }
    prompt.push_str("Input:\n");
    for line in batch {
        let _ = writeln!(prompt, "- {line}");
    }
    prompt
}

/// Stricter prompt for the attempt after an unusable reply.
pub fn summary_retry_prompt(
    batch: &[String],
    bucket: Bucket,
    chat_language: Language,
    dominant_threshold: f64,
    attempt: u32,
) -> String {
    let mut prompt = summary_prompt(batch, bucket, chat_language, dominant_threshold);
    let _ = write!(
        prompt,
        "\nPrevious attempt #{} was unusable due to copy/mixing/repetition.\n\
         Retry instructions:\n\
         - Use fresh sentence structure.\n\
         - Keep variety in openings.\n\
         - Do not output placeholders like {{topic}}.\n",
        attempt.saturating_sub(1).max(1)
    );
    prompt
}
