//! Scenario definitions: one prompt for the agent-under-test plus the
//! verdict the evaluation is expected to reach.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::validate_suite_schema;

/// Errors that can occur when loading scenarios.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Scenario suite does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Duplicate scenario name: {0}")]
    DuplicateName(String),
}

/// A fixed (prompt, expected verdict) test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Unique, human-readable name (also used in run ids)
    pub name: String,

    /// Prompt handed to the agent-under-test
    pub prompt: String,

    /// Whether the evaluation is expected to pass
    pub expected_pass: bool,
}

impl ScenarioDefinition {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>, expected_pass: bool) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            expected_pass,
        }
    }

    /// Parse a single scenario from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: ScenarioDefinition = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a single scenario from JSON.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: ScenarioDefinition = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a single scenario from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Filesystem-safe form of the name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Reject blank names and prompts.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() || self.slug().is_empty() {
            return Err(ScenarioError::MissingField("name".to_string()));
        }
        if self.prompt.trim().is_empty() {
            return Err(ScenarioError::MissingField("prompt".to_string()));
        }
        Ok(())
    }
}

/// A named collection of scenarios, typically one YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSuite {
    #[serde(default)]
    pub description: Option<String>,

    pub scenarios: Vec<ScenarioDefinition>,
}

impl ScenarioSuite {
    /// Parse a suite from YAML, validating it against the suite schema.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a suite from JSON, validating it against the suite schema.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a suite from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ScenarioError> {
        validate_suite_schema(&value).map_err(ScenarioError::SchemaError)?;
        let suite: ScenarioSuite = serde_json::from_value(value)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Ensure every scenario is valid and slugs are unique.
    ///
    /// Slugs (not raw names) must be unique because they key run directories.
    fn validate(&self) -> Result<(), ScenarioError> {
        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.slug()) {
                return Err(ScenarioError::DuplicateName(scenario.name.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
