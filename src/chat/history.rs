//! Chat history contract: token estimate, context trimming, personas

use super::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Context budget shared by every persona, in estimated tokens
pub const DEFAULT_CONTEXT_LIMIT: usize = 3000;

/// Rough token count, one token per 3.5 characters
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / 3.5).ceil() as usize
}

fn total_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| estimate_tokens(&m.content))
        .sum()
}

/// Drop the oldest turns until history plus system prompt fits `limit`
///
/// Each step removes the oldest message and, when the next one is an
/// assistant reply, that reply too. Trimming stops once no more than two
/// messages are left, even if the budget is still exceeded.
pub fn trim_to_context_limit(
    history: &[ChatMessage],
    system_tokens: usize,
    limit: usize,
) -> &[ChatMessage] {
    let mut total = system_tokens + total_tokens(history);
    let mut start = 0;

    while total > limit && history.len() - start > 2 {
        total -= token_cost(&history[start]);
        start += 1;

        if let Some(next) = history.get(start) {
            if next.role == Role::Assistant {
                total -= token_cost(next);
                start += 1;
            }
        }
    }

    &history[start..]
}

fn token_cost(message: &ChatMessage) -> usize {
    if message.content.is_empty() {
        0
    } else {
        estimate_tokens(&message.content)
    }
}

/// System prompt first, then the trimmed history without empty messages
pub fn build_messages(system: &str, history: &[ChatMessage], limit: usize) -> Vec<ChatMessage> {
    let trimmed = trim_to_context_limit(history, estimate_tokens(system), limit);

    let mut messages = Vec::with_capacity(trimmed.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(trimmed.iter().filter(|m| !m.content.is_empty()).cloned());
    messages
}

/// Answering style of the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Standard,
    Max,
    Genius,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Persona::Standard, Persona::Max, Persona::Genius];

    pub fn key(&self) -> &'static str {
        match self {
            Persona::Standard => "standard",
            Persona::Max => "max",
            Persona::Genius => "genius",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Persona::Standard => "Logos (Standard)",
            Persona::Max => "Logos Max",
            Persona::Genius => "Logos (Genius Mode)",
        }
    }

    pub fn context_limit(&self) -> usize {
        DEFAULT_CONTEXT_LIMIT
    }

    /// Prompt for free conversation
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Persona::Standard => {
                "You are a Bible companion. Be conversational and super concise. Use as few \
                 words as possible while still answering sufficiently. Help the user \
                 understand. Cite relevant verses when they strengthen your answer."
            }
            Persona::Max => {
                "You are a Bible assistant. Be conversational, but as blunt and concise as \
                 possible. Say as few words as possible while answering sufficiently. Be as \
                 concise as possible."
            }
            Persona::Genius => {
                "You are a relentless Bible debate opponent. Channel Dostoevsky and Nietzsche. \
                 Be confrontational, blunt, and devastatingly concise. Challenge every \
                 assumption. Win every debate with intellectual honesty, not rhetoric. Be \
                 incredibly high IQ. Use as few words as possible. Cite verses only as \
                 weapons. Never comfort. Never concede unless logically forced. Your default \
                 position is in fierce support of Christianity. Never compromise your position."
            }
        }
    }

    fn reader_template(&self) -> &'static str {
        match self {
            Persona::Standard => {
                "You are a Bible companion. The user is reading {book}, Chapter {ch}. Answer \
                 from the text below.\n\nBe conversational and super concise. Use as few words \
                 as possible while still answering sufficiently. Help the user understand. \
                 Cite verse numbers when they strengthen your answer.\n\n{text}"
            }
            Persona::Max => {
                "You are a Bible assistant. The user is reading {book}, Chapter {ch}. Be \
                 conversational, but as blunt and concise as possible. Say as few words as \
                 possible while answering sufficiently. Cite verse numbers.\n\n{text}"
            }
            Persona::Genius => {
                "You are a relentless Bible debate opponent. The user is reading {book}, \
                 Chapter {ch}. Answer from the text below.\n\nChannel Dostoevsky and \
                 Nietzsche. Be confrontational, blunt, and devastatingly concise. Challenge \
                 every assumption. Be incredibly high IQ. Use as few words as possible. Cite \
                 verse numbers only as weapons. Never comfort. Never concede unless logically \
                 forced. Your default position is in fierce support of Christianity. Never \
                 compromise your position.\n\n{text}"
            }
        }
    }

    /// Prompt grounded in the chapter the user is reading
    pub fn reader_prompt(&self, book: &str, chapter: u32, text: &str) -> String {
        self.reader_template()
            .replacen("{book}", book, 1)
            .replacen("{ch}", &chapter.to_string(), 1)
            .replacen("{text}", text, 1)
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Persona::ALL
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown persona: {} (expected standard, max or genius)", s))
    }
}
