//! Chat prompt formatting
//!
//! Renders messages in the Llama 3 instruct template and trims old turns so
//! the prompt fits the context window.

use crate::session::transcript::CHARS_PER_TOKEN;
use crate::types::message::{Role, Turn};

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const END_OF_TURN: &str = "<|eot_id|>";

/// One message as the model sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Turn> for PromptMessage {
    fn from(turn: &Turn) -> Self {
        Self::new(turn.role, turn.text.clone())
    }
}

fn header(role: Role) -> String {
    format!("<|start_header_id|>{}<|end_header_id|>\n\n", role.as_str())
}

/// Render `messages` and open an assistant turn for the model to complete
pub fn format_llama3(messages: &[PromptMessage]) -> String {
    let mut out = String::from(BEGIN_OF_TEXT);
    for message in messages {
        out.push_str(&header(message.role));
        out.push_str(&message.content);
        out.push_str(END_OF_TURN);
    }
    out.push_str(&header(Role::Assistant));
    out
}

fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Build the prompt for the next reply: system prompt plus as many trailing
/// turns as fit in `context_length` next to `max_new_tokens` of output.
///
/// The newest turn is always included, even if it alone overflows; the
/// engine then reports the overflow precisely.
pub fn build_prompt_window(
    system_prompt: &str,
    turns: &[Turn],
    context_length: u32,
    max_new_tokens: u32,
) -> Vec<PromptMessage> {
    let budget = (context_length as usize).saturating_sub(max_new_tokens as usize);
    let mut used = estimate_tokens(system_prompt);

    let mut start = turns.len();
    for (idx, turn) in turns.iter().enumerate().rev() {
        let cost = estimate_tokens(&turn.text) + 4;
        if used + cost > budget && start < turns.len() {
            break;
        }
        used += cost;
        start = idx;
    }

    if start > 0 {
        tracing::debug!("Prompt window drops {} oldest turns", start);
    }

    let mut messages = Vec::with_capacity(turns.len() - start + 1);
    if !system_prompt.trim().is_empty() {
        messages.push(PromptMessage::new(Role::System, system_prompt));
    }
    messages.extend(turns[start..].iter().map(PromptMessage::from));
    messages
}

/// A rendered prompt that fits the token budget, or the smallest one that
/// could be built when the newest message alone is too long
#[derive(Debug)]
pub struct FittedPrompt<T> {
    pub tokens: Vec<T>,
    /// Oldest conversation messages left out to make room
    pub dropped: usize,
}

/// Render and tokenize `messages`, dropping the oldest non-system messages
/// until the prompt is at most `budget` tokens. The system prompt and the
/// newest message are never dropped.
pub fn fit_to_budget<T, E>(
    mut messages: Vec<PromptMessage>,
    budget: usize,
    mut tokenize: impl FnMut(&str) -> Result<Vec<T>, E>,
) -> Result<FittedPrompt<T>, E> {
    let mut dropped = 0;
    loop {
        let tokens = tokenize(&format_llama3(&messages))?;
        if tokens.len() <= budget {
            return Ok(FittedPrompt { tokens, dropped });
        }

        let remaining = messages.iter().filter(|m| m.role != Role::System).count();
        let oldest = messages.iter().position(|m| m.role != Role::System);
        match oldest {
            Some(idx) if remaining > 1 => {
                messages.remove(idx);
                dropped += 1;
            }
            _ => return Ok(FittedPrompt { tokens, dropped }),
        }
    }
}
