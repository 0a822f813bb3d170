//! Prompts for agent lines, group dialogue and question replies.

use std::fmt::Write as _;

use crate::text::Language;

/// Shared prompt context.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    /// Language every line must be in
    pub language: Language,
    /// Recent agent lines, oldest first
    pub agent_lines: &'a [String],
    /// Recent real-user lines (`source: text`), oldest first
    pub real_lines: &'a [String],
    /// Word cap for English lines
    pub max_words_en: usize,
    /// Character cap for Chinese lines
    pub max_chars_zh: usize,
    /// Use the detailed prompt variants
    pub advanced: bool,
}

impl PromptContext<'_> {
    fn language_rule(&self) -> &'static str {
        match self.language {
            Language::Zh => "仅用简体中文回复。",
            Language::En | Language::Other => "Reply in English only.",
        }
    }

    fn length_rule(&self) -> String {
        match self.language {
            Language::Zh => format!("- Keep it within {} Chinese characters.\n", self.max_chars_zh),
            Language::En | Language::Other => format!("- Keep it within {} words.\n", self.max_words_en),
        }
    }

    fn push_context(&self, prompt: &mut String) {
        if !self.real_lines.is_empty() {
            let _ = writeln!(prompt, "Recent real-player chat:\n{}", self.real_lines.join("\n"));
        }
        if !self.agent_lines.is_empty() {
            let _ = writeln!(prompt, "Recent agent chat:\n{}", self.agent_lines.join("\n"));
        }
    }
}

/// One line for one agent in `scene` (`idle`, `followup-reply`, ...).
pub fn single_line_prompt(ctx: &PromptContext<'_>, scene: &str, style: &str, topic: &str) -> String {
    let scene = if scene.trim().is_empty() { "chat" } else { scene };
    let mut prompt = String::new();
    if !ctx.advanced {
        let _ = write!(
            prompt,
            "You are an active player speaking in a game server's global chat.\n\
             {}\n\
             Context scene: {scene}\n\
             Rules:\n\
             - Output exactly one short chat line.\n\
             - Do not copy any provided line.\n\
             - Keep it natural and practical.\n\
             - No bullets, no numbering, no quotes.\n\
             Seed topic: {topic}\n\
             Recent lines:\n{}",
            ctx.language_rule(),
            ctx.agent_lines.join("\n")
        );
        return prompt;
    }

    prompt.push_str("You are a human player in a game server's global chat.\n");
    let _ = writeln!(prompt, "{}", ctx.language_rule());
    let _ = writeln!(prompt, "Scene: {scene}");
    let _ = writeln!(prompt, "Persona style: {style}");
    let _ = writeln!(prompt, "Topic hint: {topic}");
    prompt.push_str("Hard rules:\n");
    prompt.push_str("- Output exactly one line.\n");
    prompt.push_str("- Keep it natural, short, and human.\n");
    prompt.push_str("- Never copy any context line directly.\n");
    prompt.push_str("- No role tags, no bullet list, no quotes, no markdown.\n");
    prompt.push_str("- Avoid repetitive openings and avoid textbook tone.\n");
    prompt.push_str(&ctx.length_rule());
    ctx.push_context(&mut prompt);
    prompt
}

/// `line_count` lines of dialogue between `speakers` (`(name, style)`).
pub fn group_prompt(
    ctx: &PromptContext<'_>,
    seed_topic: &str,
    speakers: &[(String, String)],
    line_count: usize,
) -> String {
    let language_rule = match ctx.language {
        Language::Zh => "仅使用简体中文。",
        Language::En | Language::Other => "Use English only.",
    };
    let length_rule = match ctx.language {
        Language::Zh => format!("- 每行不超过 {} 个中文字符。\n", ctx.max_chars_zh),
        Language::En | Language::Other => format!("- Keep each line <= {} words.\n", ctx.max_words_en),
    };
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Generate exactly {line_count} lines of natural game server chat dialogue."
    );
    let _ = writeln!(prompt, "{language_rule}");
    prompt.push_str("Hard rules:\n");
    prompt.push_str("- One line per row, no bullets, no numbering, no role labels.\n");
    prompt.push_str("- Keep conversation ordered: plan -> split work -> confirm.\n");
    prompt.push_str("- Every line must be different in wording and opening phrase.\n");
    prompt.push_str("- Never output placeholders like {topic}.\n");
    prompt.push_str("- Never output the literal word 'topic'.\n");
    prompt.push_str("- No AI/meta wording.\n");
    prompt.push_str(&length_rule);
    let _ = writeln!(prompt, "Seed subject: {seed_topic}");
    prompt.push_str("Speaker styles:\n");
    for (name, style) in speakers {
        let _ = writeln!(prompt, "- {name}: {style}");
    }
    let _ = writeln!(prompt, "Recent real-player chat:\n{}", ctx.real_lines.join("\n"));
    let _ = write!(prompt, "Recent agent chat to avoid repeating:\n{}", ctx.agent_lines.join("\n"));
    prompt
}

/// Reply to `question` asked by `source`.
pub fn qa_prompt(ctx: &PromptContext<'_>, question: &str, source: &str) -> String {
    let mut prompt = String::new();
    if !ctx.advanced {
        let _ = write!(
            prompt,
            "You are a normal player in a game server's chat.\n\
             {}\n\
             Rules:\n\
             - Output exactly one short chat line.\n\
             - Do not repeat the player's original sentence.\n\
             - Keep it practical and human (route, gear, farm, fix, timing).\n\
             - No role tags, no explanation, no markdown.\n\
             Player: {source}\n\
             Question: {question}\n\
             Recent lines:\n{}",
            ctx.language_rule(),
            ctx.agent_lines.join("\n")
        );
        return prompt;
    }

    prompt.push_str("You are a normal player replying in a game server's global chat.\n");
    let _ = writeln!(prompt, "{}", ctx.language_rule());
    let _ = writeln!(prompt, "Player: {source}");
    let _ = writeln!(prompt, "Question: {question}");
    prompt.push_str("Hard rules:\n");
    prompt.push_str("- Output exactly one line.\n");
    prompt.push_str("- Directly answer or react to the player in a natural tone.\n");
    prompt.push_str("- Do not copy the question sentence pattern.\n");
    prompt.push_str("- Avoid AI wording and avoid lecture tone.\n");
    prompt.push_str("- No role tags, no markdown, no quotes.\n");
    prompt.push_str(&ctx.length_rule());
    ctx.push_context(&mut prompt);
    prompt
}
