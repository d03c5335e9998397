//! Chat capability
//!
//! Conversation about the text sits behind one [`ChatBackend`] trait so the
//! rest of the crate never knows which model answers. Three backends exist:
//! the OpenAI chat completions API (streamed), a non-streaming edge proxy,
//! and a local Ollama server (streamed).

mod backends;
mod history;

pub use backends::{
    backend_from_config, LineBuffer, OllamaBackend, OpenAiBackend, ProxyBackend, SseDecoder,
    SseEvent,
};
pub use history::{
    build_messages, estimate_tokens, trim_to_context_limit, Persona, DEFAULT_CONTEXT_LIMIT,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Chat backend returned HTTP {status}: {snippet}")]
    Http { status: u16, snippet: String },

    #[error("Chat transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode chat response: {0}")]
    Decode(String),

    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Chat backend returned an empty response")]
    EmptyResponse,

    #[error("Invalid chat endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Unknown chat backend: {0}")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn, serialized the way every backend expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Receives answer text as it arrives
pub type DeltaSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// A model that answers a chat
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the full message list, reporting text through `on_delta` as it
    /// arrives, and return the complete answer
    async fn complete(
        &self,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ChatError>;

    fn name(&self) -> &str;
}

/// A running conversation with one persona
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    persona: Persona,
    history: Vec<ChatMessage>,
    /// Set when talking about a chapter instead of free conversation
    system_override: Option<String>,
}

impl Conversation {
    pub fn new(persona: Persona) -> Self {
        Self {
            persona,
            history: Vec::new(),
            system_override: None,
        }
    }

    /// Ground the conversation in a chapter the user is reading
    pub fn reading(persona: Persona, book: &str, chapter: u32, text: &str) -> Self {
        Self {
            persona,
            history: Vec::new(),
            system_override: Some(persona.reader_prompt(book, chapter, text)),
        }
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn system_prompt(&self) -> &str {
        self.system_override
            .as_deref()
            .unwrap_or_else(|| self.persona.system_prompt())
    }

    /// Messages that would be sent for the current history
    pub fn messages(&self) -> Vec<ChatMessage> {
        build_messages(
            self.system_prompt(),
            &self.history,
            self.persona.context_limit(),
        )
    }

    /// Ask one question and record the answer
    ///
    /// On failure the question stays in the history without a reply.
    pub async fn ask(
        &mut self,
        backend: &dyn ChatBackend,
        question: &str,
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        self.history.push(ChatMessage::user(question));
        let messages = self.messages();

        tracing::debug!(
            "Chat via {} with {} messages ({} persona)",
            backend.name(),
            messages.len(),
            self.persona
        );

        let answer = backend.complete(&messages, on_delta).await?;
        self.history.push(ChatMessage::assistant(answer.clone()));
        Ok(answer)
    }
}
