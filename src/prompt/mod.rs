// Prompt construction for completions and chat
// Author: kelexine (https://github.com/kelexine)

use crate::client::{ChatMessage, ChatRequest, ChatRole, CompletionRequest};

/// Marks the cursor position inside the document excerpt sent to the model.
pub const CURSOR_MARKER: &str = "<mask/>";

const COMPLETION_SYSTEM_PROMPT: &str = "You complete text at the cursor position marked with <mask/>. \
Reply with only the text that should replace <mask/>, without repeating the surrounding text, \
without explanations and without code fences.";

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful writing assistant embedded in a text editor. \
Answer concisely and format responses as Markdown.";

/// Keeps at most `window` characters before and after the cursor.
///
/// The excerpt is what identifies a request, so trimming it here also makes
/// keystrokes far from the cursor irrelevant to caching.
pub fn truncate_context(prefix: &str, suffix: &str, window: usize) -> (String, String) {
    let prefix_len = prefix.chars().count();
    let prefix = prefix
        .chars()
        .skip(prefix_len.saturating_sub(window))
        .collect();
    let suffix = suffix.chars().take(window).collect();
    (prefix, suffix)
}

/// Messages sent for an inline completion.
pub fn completion_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let language = if request.language.is_empty() {
        "plain text"
    } else {
        request.language.as_str()
    };

    vec![
        ChatMessage::system(COMPLETION_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Language: {}\n\n{}{}{}",
            language, request.prefix, CURSOR_MARKER, request.suffix
        )),
    ]
}

/// Messages sent for a chat turn; a default system prompt is added when the
/// conversation does not carry its own.
pub fn chat_messages(request: &ChatRequest) -> Vec<ChatMessage> {
    let has_system = request
        .messages
        .first()
        .map(|m| m.role == ChatRole::System)
        .unwrap_or(false);

    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !has_system {
        messages.push(ChatMessage::system(CHAT_SYSTEM_PROMPT));
    }
    messages.extend(request.messages.iter().cloned());
    messages
}

/// Cleans a raw model answer into insertable text.
pub fn clean_completion(raw: &str) -> String {
    let mut text = raw.replace(CURSOR_MARKER, "");

    let trimmed = text.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6 {
        let inner = &trimmed[3..trimmed.len() - 3];
        // Drop the language tag on the opening fence line.
        let inner = match inner.find('\n') {
            Some(newline) => &inner[newline + 1..],
            None => inner,
        };
        text = inner.trim_end_matches('\n').to_string();
    }

    text
}
