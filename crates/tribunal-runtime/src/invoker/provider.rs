//! Chat-completion providers behind the invocation boundary.
//!
//! [`LlmProvider`] is the seam for HTTP model backends. [`ProviderInvoker`]
//! turns any provider into an [`AgentInvoker`], which is how LLM judges are
//! usually wired into the panel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AgentInvoker, Invocation, InvocationError};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<ProviderError> for InvocationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(after) => InvocationError::Timeout(after),
            ProviderError::ApiError { status, message } => InvocationError::NonZeroExit {
                code: Some(i32::from(status)),
                diagnostics: message,
            },
            ProviderError::RateLimited { .. } => InvocationError::NonZeroExit {
                code: Some(429),
                diagnostics: err.to_string(),
            },
            other => InvocationError::NonZeroExit {
                code: None,
                diagnostics: other.to_string(),
            },
        }
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic judging)
    pub temperature: f32,

    /// Request timeout; overridden per call by the invocation timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
            timeout: Duration::from_secs(120),
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Provider abstraction allows swapping LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get provider name for logs.
    fn name(&self) -> &str;
}

/// Adapts an [`LlmProvider`] to the [`AgentInvoker`] contract.
pub struct ProviderInvoker {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    system_prompt: Option<String>,
}

impl ProviderInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            system_prompt: None,
        }
    }

    /// Prepend a system message to every invocation.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[async_trait]
impl AgentInvoker for ProviderInvoker {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<Invocation, InvocationError> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        let config = CompletionConfig {
            timeout,
            ..self.config.clone()
        };

        let response = tokio::time::timeout(timeout, self.provider.complete(messages, &config))
            .await
            .map_err(|_| InvocationError::Timeout(timeout))??;

        let diagnostics = match &response.stop_reason {
            Some(reason) => format!("model={} stop_reason={}", response.model, reason),
            None => format!("model={}", response.model),
        };

        Invocation::from_output(response.content, diagnostics, start.elapsed())
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
