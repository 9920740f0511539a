//! Harness configuration.
//!
//! Loaded from YAML; durations use humantime notation (`"90s"`, `"5m"`).
//!
//! ```yaml
//! artifact_root: ./tribunal-artifacts
//! domains: [correctness, security, maintainability, testing]
//! agent_timeout: 5m
//! judge_timeout: 2m
//! global_timeout: 5m
//! pass_threshold_percent: 70
//! max_judge_retries: 0
//! rubric_dir: ./rubrics
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tribunal_core::{Domain, ScoreAggregator, DEFAULT_PASS_THRESHOLD_PERCENT};

use crate::panel::RetryPolicy;
use crate::rubric::{BuiltinRubrics, DirectoryRubrics, RubricSource};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("At least one domain must be configured")]
    NoDomains,

    #[error("Domain configured twice: {0}")]
    DuplicateDomain(Domain),

    #[error("Pass threshold must be within 1..=100, got {0}")]
    InvalidThreshold(u32),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Judge timeout {judge:?} exceeds global timeout {global:?}")]
    JudgeTimeoutExceedsGlobal { judge: Duration, global: Duration },
}

/// Serde adapter for humantime durations.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Settings for a harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Where run directories and `history.log` are written
    pub artifact_root: PathBuf,

    /// Domains judged on every run
    pub domains: Vec<Domain>,

    #[serde(with = "humantime_duration")]
    pub agent_timeout: Duration,

    /// Timeout for each judge invocation
    #[serde(with = "humantime_duration")]
    pub judge_timeout: Duration,

    /// Deadline for the whole panel
    #[serde(with = "humantime_duration")]
    pub global_timeout: Duration,

    pub pass_threshold_percent: u32,

    /// Retries for transient judge failures
    pub max_judge_retries: usize,

    /// Load rubrics from `<rubric_dir>/<domain>.md` instead of the built-ins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("tribunal-artifacts"),
            domains: Domain::ALL.to_vec(),
            agent_timeout: Duration::from_secs(300),
            judge_timeout: Duration::from_secs(120),
            global_timeout: Duration::from_secs(300),
            pass_threshold_percent: DEFAULT_PASS_THRESHOLD_PERCENT,
            max_judge_retries: 0,
            rubric_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }
        for (i, domain) in self.domains.iter().enumerate() {
            if self.domains[..i].contains(domain) {
                return Err(ConfigError::DuplicateDomain(*domain));
            }
        }

        if !(1..=100).contains(&self.pass_threshold_percent) {
            return Err(ConfigError::InvalidThreshold(self.pass_threshold_percent));
        }

        for (name, value) in [
            ("agent_timeout", self.agent_timeout),
            ("judge_timeout", self.judge_timeout),
            ("global_timeout", self.global_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }

        if self.judge_timeout > self.global_timeout {
            return Err(ConfigError::JudgeTimeoutExceedsGlobal {
                judge: self.judge_timeout,
                global: self.global_timeout,
            });
        }

        Ok(())
    }

    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = root.into();
        self
    }

    pub fn with_domains(mut self, domains: &[Domain]) -> Self {
        self.domains = domains.to_vec();
        self
    }

    pub fn with_timeouts(mut self, agent: Duration, judge: Duration, global: Duration) -> Self {
        self.agent_timeout = agent;
        self.judge_timeout = judge;
        self.global_timeout = global;
        self
    }

    /// Aggregator for the configured domains and threshold.
    pub fn aggregator(&self) -> Result<ScoreAggregator, ConfigError> {
        self.validate()?;
        ScoreAggregator::with_threshold(&self.domains, self.pass_threshold_percent)
            .map_err(|_| ConfigError::InvalidThreshold(self.pass_threshold_percent))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.max_judge_retries)
    }

    /// Rubric source named by `rubric_dir`, or the built-in rubrics.
    pub fn rubric_source(&self) -> Arc<dyn RubricSource> {
        match &self.rubric_dir {
            Some(dir) => Arc::new(DirectoryRubrics::new(dir)),
            None => Arc::new(BuiltinRubrics),
        }
    }
}
