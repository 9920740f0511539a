//! Anthropic Messages API provider.
//!
//! The API key is held as a [`SecretString`] and only exposed when the
//! request header is built.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    api_key: SecretString,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, ProviderError> {
        let key = std::env::var(ANTHROPIC_API_KEY_ENV).map_err(|_| {
            ProviderError::NotConfigured(format!("{} is not set", ANTHROPIC_API_KEY_ENV))
        })?;
        if key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} is empty",
                ANTHROPIC_API_KEY_ENV
            )));
        }
        Ok(Self::new(key))
    }

    /// Create from JSON configuration with environment fallback.
    ///
    /// Reads `api_key` and `base_url`; a missing `api_key` falls back to
    /// [`ANTHROPIC_API_KEY_ENV`].
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let provider = match config["api_key"].as_str() {
            Some(key) if !key.is_empty() => Self::new(key),
            _ => Self::from_env()?,
        };

        match config["base_url"].as_str() {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => Err(
                ProviderError::NotConfigured("base_url must start with http:// or https://".into()),
            ),
            Some(url) => Ok(provider.with_base_url(url)),
            None => Ok(provider),
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> AnthropicRequest {
    let mut system: Option<String> = None;
    let mut api_messages = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role == "system" {
            system = Some(match system {
                Some(existing) => format!("{existing}\n\n{}", msg.content),
                None => msg.content,
            });
        } else {
            api_messages.push(AnthropicMessage {
                role: msg.role,
                content: msg.content,
            });
        }
    }

    AnthropicRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system,
        messages: api_messages,
        temperature: config.temperature,
    }
}

fn into_completion(body: AnthropicResponse) -> CompletionResponse {
    let content = body
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    CompletionResponse {
        content,
        model: body.model,
        stop_reason: body.stop_reason,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = match response.json::<AnthropicError>().await {
                Ok(body) => body.error.message,
                Err(_) => status.to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(into_completion(body))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);

        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_config_with_api_key() {
        let config = serde_json::json!({
            "api_key": "config-api-key",
            "base_url": "https://custom.api.com/v1"
        });

        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://custom.api.com/v1");
        assert_eq!(provider.api_key.expose_secret(), "config-api-key");
    }

    #[test]
    fn test_from_config_rejects_bad_base_url() {
        let config = serde_json::json!({
            "api_key": "k",
            "base_url": "ftp://nope"
        });
        assert!(matches!(
            AnthropicProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_system_messages_are_lifted() {
        let request = build_request(
            vec![
                ChatMessage::system("Judge strictly."),
                ChatMessage::user("Output to review"),
            ],
            &CompletionConfig::default(),
        );

        assert_eq!(request.system.as_deref(), Some("Judge strictly."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"], "Output to review");
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_response_text_blocks_are_joined() {
        let body: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "SCORE naming: 8/10\n"},
                {"type": "text", "text": "SCORE modularity: 7/10"}
            ],
            "model": "claude-sonnet-4-5",
            "stop_reason": "end_turn"
        }))
        .unwrap();

        let completion = into_completion(body);
        assert_eq!(completion.content, "SCORE naming: 8/10\nSCORE modularity: 7/10");
        assert_eq!(completion.stop_reason.as_deref(), Some("end_turn"));
    }
}
