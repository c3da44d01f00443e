//! Chat model client and stateful chat session
//!
//! `ChatModel` is a single request/response round trip against an
//! OpenAI-compatible `/chat/completions` endpoint. `ChatSession` keeps the
//! system prompt and every turn so a follow-up message sees the earlier
//! exchange.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::VlsiConfig;
use crate::embeddings::OpenAiErrorResponse;
use crate::models::{ChatMessage, ChatRole};

/// Chat completion errors
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Chat response contained no messages")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,
}

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends the full conversation and returns the reply messages.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, ChatError>;

    /// Model name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAiChatClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiChatConfig {
    pub fn from_config(config: &VlsiConfig) -> Self {
        Self {
            api_key: config.openai.api_key().unwrap_or_default(),
            base_url: config.openai.base_url.clone(),
            model: config.chat.model.clone(),
            temperature: config.chat.temperature,
            timeout: Duration::from_secs(config.openai.timeout_seconds),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat-completions client. One call, no retries.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    config: OpenAiChatConfig,
}

impl OpenAiChatClient {
    pub fn new(config: OpenAiChatConfig) -> Result<Self, ChatError> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, ChatError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.trim())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);
            tracing::error!(code = status.as_u16(), message = %message, "Chat API error");
            return Err(ChatError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let replies: Vec<ChatMessage> = parsed
            .choices
            .into_iter()
            .map(|choice| ChatMessage::assistant(choice.message.content.unwrap_or_default()))
            .collect();

        if replies.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(replies)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// ChatSession
// ============================================================================

/// A conversation that remembers its turns.
pub struct ChatSession {
    model: Arc<dyn ChatModel>,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            history: vec![ChatMessage::system(system_prompt)],
        }
    }

    /// Appends `message`, sends the whole history and records the replies.
    ///
    /// On failure the user turn is rolled back so the history stays
    /// consistent with what the model has actually answered.
    pub async fn step(&mut self, message: ChatMessage) -> Result<Vec<ChatMessage>, ChatError> {
        self.history.push(message);
        match self.model.complete(&self.history).await {
            Ok(replies) => {
                self.history.extend(replies.iter().cloned());
                Ok(replies)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Number of completed user turns.
    pub fn turns(&self) -> usize {
        self.history
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .count()
    }
}
