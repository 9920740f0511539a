//! The invocation boundary.
//!
//! Both the agent-under-test and every judge are reached through
//! [`AgentInvoker`]: hand over a prompt, get text back or a structured
//! failure. Judges are simply differently-prompted invocations.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod command;
mod provider;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use command::{CommandInvoker, PromptDelivery};
pub use provider::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderInvoker,
};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, ANTHROPIC_API_KEY_ENV};

/// Errors from a single invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The underlying call signalled failure (process exit status, HTTP
    /// status, transport error).
    #[error("Invocation failed (code {code:?}): {diagnostics}")]
    NonZeroExit {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("Invocation succeeded but produced no output")]
    EmptyOutput,
}

impl InvocationError {
    /// Whether retrying the same prompt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InvocationError::Timeout(_) | InvocationError::NonZeroExit { .. }
        )
    }
}

/// Successful invocation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Primary output (stdout / completion text); the only part that is scored
    pub text: String,

    /// Diagnostic channel (stderr / provider notes), kept apart from `text`
    pub diagnostics: String,

    pub duration_ms: u64,
}

impl Invocation {
    /// Build an invocation, rejecting blank output.
    pub fn from_output(
        text: String,
        diagnostics: String,
        duration: Duration,
    ) -> Result<Self, InvocationError> {
        if text.trim().is_empty() {
            return Err(InvocationError::EmptyOutput);
        }
        Ok(Self {
            text,
            diagnostics,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

/// A black-box "run prompt, get text or fail" call.
///
/// # Contract
/// - Fails with `Timeout` if no response arrives within `timeout`
/// - Fails with `NonZeroExit` if the underlying call reports failure
/// - Fails with `EmptyOutput` if the call succeeds with blank text
/// - Has no side effects beyond the external call
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<Invocation, InvocationError>;

    /// Name for logs and artifacts.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_output_is_empty_error() {
        let result = Invocation::from_output(" \n\t".into(), "warning".into(), Duration::ZERO);
        assert_eq!(result, Err(InvocationError::EmptyOutput));
    }

    #[test]
    fn test_output_keeps_channels_apart() {
        let inv = Invocation::from_output(
            "answer".into(),
            "progress: 50%".into(),
            Duration::from_millis(1500),
        )
        .unwrap();
        assert_eq!(inv.text, "answer");
        assert_eq!(inv.diagnostics, "progress: 50%");
        assert_eq!(inv.duration_ms, 1500);
    }

    #[test]
    fn test_transient_errors() {
        assert!(InvocationError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(InvocationError::NonZeroExit {
            code: Some(1),
            diagnostics: String::new()
        }
        .is_transient());
        assert!(!InvocationError::EmptyOutput.is_transient());
    }
}
