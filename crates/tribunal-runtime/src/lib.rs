//! # tribunal-runtime
//!
//! Runs evaluation scenarios against an agent-under-test.
//!
//! `tribunal-core` scores; this crate does everything that waits on the
//! outside world:
//! - Invoking the agent and the judges (subprocess or LLM provider)
//! - Fanning judges out concurrently with per-judge and global timeouts
//! - Writing the per-run artifact directory and the shared history log
//! - Asserting the verdict each scenario expects
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tribunal_core::ScenarioDefinition;
//! use tribunal_runtime::{CommandInvoker, HarnessConfig, ScenarioRunner};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_yaml_file("tribunal.yaml")?;
//! let agent = Arc::new(CommandInvoker::new("my-agent"));
//! let judge = Arc::new(CommandInvoker::new("my-judge"));
//! let runner = ScenarioRunner::new(config, agent, judge)?;
//!
//! let scenario = ScenarioDefinition::new("add retries", "Add retries to the client", true);
//! let report = runner.run(&scenario).await?;
//! println!("{} -> {}", report.run_id, report.artifact_dir.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

use tribunal_core::{AggregateError, JudgmentResult, ScenarioError};

pub mod artifacts;
pub mod checks;
pub mod config;
pub mod invoker;
pub mod panel;
pub mod prompts;
pub mod rubric;
pub mod runner;

pub use artifacts::{
    ArtifactLogger, ArtifactReadError, ArtifactWriteError, HistoryEntry, RunArtifact,
};
pub use checks::{
    CheckFailure, CheckSet, ContainsText, ExcludesText, MatchesPattern, MinDomainScore,
    ScenarioCheck,
};
pub use config::{ConfigError, HarnessConfig};
pub use invoker::{
    AgentInvoker, ChatMessage, CommandInvoker, CompletionConfig, CompletionResponse, Invocation,
    InvocationError, LlmProvider, PromptDelivery, ProviderError, ProviderInvoker,
};
pub use panel::{JudgePanel, PanelError, RetryPolicy};
pub use rubric::{BuiltinRubrics, DirectoryRubrics, Rubric, RubricError, RubricSource};
pub use runner::{RunState, ScenarioReport, ScenarioRunner};

#[cfg(feature = "anthropic")]
pub use invoker::{AnthropicProvider, ANTHROPIC_API_KEY_ENV};

/// Errors from running a scenario.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Invalid scenario: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent invocation failed for '{scenario}': {source}")]
    AgentInvocation {
        scenario: String,
        #[source]
        source: InvocationError,
    },

    /// Every judge failed. The run is still persisted with a zero score; the
    /// failed judgments are kept for auditing.
    #[error(
        "All judges failed for '{scenario}'; artifacts in {}",
        .artifact_dir.display()
    )]
    AllJudgesFailed {
        scenario: String,
        results: Vec<JudgmentResult>,
        artifact_dir: PathBuf,
    },

    #[error("Aggregation failed: {0}")]
    Aggregate(AggregateError),

    #[error("Failed to persist artifacts: {0}")]
    Artifact(#[from] ArtifactWriteError),

    #[error(
        "Verdict mismatch for '{scenario}': expected pass={expected_pass}, got pass={actual_pass} ({total}/{max}); artifacts in {}",
        .artifact_dir.display()
    )]
    VerdictMismatch {
        scenario: String,
        expected_pass: bool,
        actual_pass: bool,
        total: u32,
        max: u32,
        artifact_dir: PathBuf,
    },

    #[error(
        "{} check(s) failed for '{scenario}'; artifacts in {}",
        .failures.len(),
        .artifact_dir.display()
    )]
    ChecksFailed {
        scenario: String,
        failures: Vec<CheckFailure>,
        artifact_dir: PathBuf,
    },
}

impl HarnessError {
    /// Run directory of a run that was persisted before failing.
    pub fn artifact_dir(&self) -> Option<&PathBuf> {
        match self {
            HarnessError::AllJudgesFailed { artifact_dir, .. }
            | HarnessError::VerdictMismatch { artifact_dir, .. }
            | HarnessError::ChecksFailed { artifact_dir, .. } => Some(artifact_dir),
            _ => None,
        }
    }
}
