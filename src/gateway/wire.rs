//! Chat-completions wire types.
//!
//! Only the fields the gateway reads are modelled. Response content arrives
//! either as a string or as a list of parts; both shapes (and anything else)
//! deserialize without error so a malformed reply degrades to an empty
//! string instead of failing the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// System prompt (when configured) followed by the user prompt
    pub messages: Vec<WireMessage>,
    /// Output ceiling
    pub max_tokens: u32,
}

/// One request message
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    /// `system` or `user`
    pub role: &'static str,
    /// Message text
    pub content: String,
}

impl ChatRequest {
    /// Build a request with an optional system prompt.
    pub fn new(model: &str, system_prompt: &str, prompt: &str, max_tokens: u32) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: system_prompt.to_string(),
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: prompt.to_string(),
        });
        Self {
            model: model.to_string(),
            messages,
            max_tokens,
        }
    }
}

/// Response body
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Completion choices; only the first is used
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// One choice
#[derive(Debug, Deserialize)]
pub struct Choice {
    /// Generated message
    pub message: Option<ResponseMessage>,
}

/// Generated message
#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    /// String or parts
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// Message content in any of the shapes providers return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string
    Text(String),
    /// List of parts
    Parts(Vec<ContentPart>),
    /// Anything else
    Other(Value),
}

/// One content part.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    /// Bare string part
    Text(String),
    /// Object part, possibly carrying `text`
    Object {
        /// Part text
        text: Option<String>,
    },
    /// Anything else
    Other(Value),
}

impl MessageContent {
    /// Flatten to text; parts are joined with newlines.
    pub fn into_text(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|part| match part {
                    ContentPart::Text(text) => Some(text),
                    ContentPart::Object { text } => text,
                    ContentPart::Other(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            MessageContent::Other(_) => String::new(),
        }
    }
}

/// Extract the first choice's content from a raw response body.
///
/// Any body that does not match the expected shape yields an empty string.
pub fn extract_content(body: &str) -> String {
    serde_json::from_str::<ChatResponse>(body)
        .ok()
        .and_then(|response| response.choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(MessageContent::into_text)
        .unwrap_or_default()
}
