//! Chat backend implementations
//!
//! - `POST {endpoint}/v1/chat/completions` with `stream: true` (OpenAI, SSE)
//! - `POST {endpoint}` with `{ messages, temperature }` (edge proxy, one JSON body)
//! - `POST {endpoint}/api/chat` with `stream: true` (Ollama, one JSON object per line)

use super::{ChatBackend, ChatError, ChatMessage, DeltaSink};
use crate::config::ChatConfig;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest upstream body excerpt carried in an error
const SNIPPET_CHARS: usize = 200;

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}

fn validate_endpoint(endpoint: &str) -> Result<String, ChatError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty()
        || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        return Err(ChatError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(endpoint.trim_end_matches('/').to_string())
}

fn build_client(timeout: Duration, headers: header::HeaderMap) -> Result<reqwest::Client, ChatError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!("Chat backend returned HTTP {}", status);
    Err(ChatError::Http {
        status,
        snippet: snippet(&body),
    })
}

/// Splits a byte stream into complete lines
///
/// Bytes after the last newline stay buffered until more arrive, so
/// multi-byte characters split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the stream ends
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// One decoded server-sent event from a chat completions stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decoder for `data: {...}` lines terminated by `data: [DONE]`
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineBuffer,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.lines
            .push(chunk)
            .iter()
            .filter_map(|line| Self::decode_line(line))
            .collect()
    }

    pub fn finish(&mut self) -> Option<SseEvent> {
        self.lines.finish().and_then(|line| Self::decode_line(&line))
    }

    /// Non-data lines, empty deltas and unparseable payloads yield nothing
    fn decode_line(line: &str) -> Option<SseEvent> {
        let data = line.strip_prefix("data: ")?.trim();
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|s| !s.is_empty())
                .map(SseEvent::Delta),
            Err(e) => {
                tracing::debug!("Skipping undecodable stream line: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// OpenAI-compatible chat completions with streamed answers
#[derive(Debug)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    url_chat: String,
    model: String,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let base = validate_endpoint(endpoint)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ChatError::Decode(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        tracing::info!("OpenAI chat backend at {} using {}", base, model);

        Ok(Self {
            client: build_client(timeout, headers)?,
            url_chat: format!("{}/v1/chat/completions", base),
            model: model.to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        let started = Instant::now();
        let body = CompletionRequest {
            model: Some(&self.model),
            messages,
            temperature: self.temperature,
            stream: true,
        };

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(resp).await?;

        let mut decoder = SseDecoder::new();
        let mut answer = String::new();
        let mut stream = resp.bytes_stream();

        'read: while let Some(chunk) = stream.next().await {
            for event in decoder.push(&chunk?) {
                match event {
                    SseEvent::Delta(text) => {
                        on_delta(&text);
                        answer.push_str(&text);
                    }
                    SseEvent::Done => break 'read,
                }
            }
        }
        if let Some(SseEvent::Delta(text)) = decoder.finish() {
            on_delta(&text);
            answer.push_str(&text);
        }

        tracing::debug!(
            "OpenAI answer: {} chars in {:?}",
            answer.len(),
            started.elapsed()
        );

        if answer.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(answer)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Edge proxy that holds the API key and answers in one response
#[derive(Debug)]
pub struct ProxyBackend {
    client: reqwest::Client,
    url: String,
    temperature: f32,
}

impl ProxyBackend {
    pub fn new(endpoint: &str, temperature: f32, timeout: Duration) -> Result<Self, ChatError> {
        let url = validate_endpoint(endpoint)?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        tracing::info!("Proxy chat backend at {}", url);

        Ok(Self {
            client: build_client(timeout, headers)?,
            url,
            temperature,
        })
    }

    /// `choices[0].message.content` of a completion body
    fn extract_content(body: &str) -> Result<String, ChatError> {
        let parsed: CompletionResponse = serde_json::from_str(body).map_err(|e| {
            ChatError::Decode(format!("{e}; body starts with {:?}", snippet(body)))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.is_empty())
            .ok_or(ChatError::EmptyResponse)
    }
}

#[async_trait]
impl ChatBackend for ProxyBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        let body = CompletionRequest {
            model: None,
            messages,
            temperature: self.temperature,
            stream: false,
        };

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let text = ensure_success(resp).await?.text().await?;

        let content = Self::extract_content(&text)?;
        on_delta(&content);
        Ok(content)
    }

    fn name(&self) -> &str {
        "proxy"
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<CompletionMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Local Ollama server, streamed as newline-delimited JSON
#[derive(Debug)]
pub struct OllamaBackend {
    client: reqwest::Client,
    url_chat: String,
    model: String,
    temperature: f32,
}

impl OllamaBackend {
    pub fn new(
        endpoint: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let base = validate_endpoint(endpoint)?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        tracing::info!("Ollama chat backend at {} using {}", base, model);

        Ok(Self {
            client: build_client(timeout, headers)?,
            url_chat: format!("{}/api/chat", base),
            model: model.to_string(),
            temperature,
        })
    }

    /// Decode one stream line into its text and done flag
    fn decode_line(line: &str) -> Result<(Option<String>, bool), ChatError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok((None, false));
        }

        let chunk: OllamaChunk = serde_json::from_str(line)
            .map_err(|e| ChatError::Decode(format!("{e}; line {:?}", snippet(line))))?;
        if let Some(error) = chunk.error {
            return Err(ChatError::Decode(error));
        }

        let text = chunk
            .message
            .and_then(|m| m.content)
            .filter(|s| !s.is_empty());
        Ok((text, chunk.done))
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ChatError> {
        let body = OllamaRequest {
            model: &self.model,
            messages,
            stream: true,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(resp).await?;

        let mut lines = LineBuffer::new();
        let mut answer = String::new();
        let mut stream = resp.bytes_stream();

        'read: while let Some(chunk) = stream.next().await {
            for line in lines.push(&chunk?) {
                let (text, done) = Self::decode_line(&line)?;
                if let Some(text) = text {
                    on_delta(&text);
                    answer.push_str(&text);
                }
                if done {
                    break 'read;
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let (Some(text), _) = Self::decode_line(&line)? {
                on_delta(&text);
                answer.push_str(&text);
            }
        }

        if answer.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(answer)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Build the configured backend
pub fn backend_from_config(config: &ChatConfig) -> Result<Arc<dyn ChatBackend>, ChatError> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.backend.as_str() {
        "openai" => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| ChatError::MissingApiKey(config.api_key_env.clone()))?;
            Ok(Arc::new(OpenAiBackend::new(
                &config.endpoint,
                &api_key,
                &config.model,
                config.temperature,
                timeout,
            )?))
        }
        "proxy" => Ok(Arc::new(ProxyBackend::new(
            &config.endpoint,
            config.temperature,
            timeout,
        )?)),
        "ollama" => Ok(Arc::new(OllamaBackend::new(
            &config.endpoint,
            &config.model,
            config.temperature,
            timeout,
        )?)),
        other => Err(ChatError::UnknownBackend(other.to_string())),
    }
}
