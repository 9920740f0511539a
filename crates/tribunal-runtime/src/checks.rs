//! Scenario checks run after the verdict assertion.
//!
//! Checks only inspect a finished run; they cannot change scores or the
//! verdict. Every check runs and every failure is reported.

use std::fmt;

use regex::Regex;
use tribunal_core::{Domain, JudgmentResult};

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub check: String,
    pub message: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}

/// A post-run assertion over the agent output and the judgments.
///
/// Both hooks default to passing, so a check implements only what it
/// inspects.
pub trait ScenarioCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect the raw agent output.
    fn check_output(&self, _agent_output: &str) -> Result<(), String> {
        Ok(())
    }

    /// Inspect one judgment.
    fn check_judgment(&self, _judgment: &JudgmentResult) -> Result<(), String> {
        Ok(())
    }

    /// Inspect the full judgment set. Defaults to [`check_judgment`] on each.
    ///
    /// [`check_judgment`]: ScenarioCheck::check_judgment
    fn check_judgments(&self, judgments: &[JudgmentResult]) -> Vec<String> {
        judgments
            .iter()
            .filter_map(|j| self.check_judgment(j).err())
            .collect()
    }
}

/// Ordered collection of checks.
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Box<dyn ScenarioCheck>>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn add(&mut self, check: Box<dyn ScenarioCheck>) {
        self.checks.push(check);
    }

    pub fn with(mut self, check: impl ScenarioCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check; never short-circuits.
    pub fn run(&self, agent_output: &str, judgments: &[JudgmentResult]) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        for check in &self.checks {
            let messages = check
                .check_output(agent_output)
                .err()
                .into_iter()
                .chain(check.check_judgments(judgments));
            failures.extend(messages.map(|message| CheckFailure {
                check: check.name().to_string(),
                message,
            }));
        }
        failures
    }
}

impl fmt::Debug for CheckSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.checks.iter().map(|c| c.name()))
            .finish()
    }
}

/// Agent output must contain a substring.
#[derive(Debug, Clone)]
pub struct ContainsText {
    name: String,
    needle: String,
}

impl ContainsText {
    pub fn new(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self {
            name: format!("contains '{needle}'"),
            needle,
        }
    }
}

impl ScenarioCheck for ContainsText {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_output(&self, agent_output: &str) -> Result<(), String> {
        if agent_output.contains(&self.needle) {
            Ok(())
        } else {
            Err(format!("agent output does not contain '{}'", self.needle))
        }
    }
}

/// Agent output must not contain a substring.
#[derive(Debug, Clone)]
pub struct ExcludesText {
    name: String,
    needle: String,
}

impl ExcludesText {
    pub fn new(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self {
            name: format!("excludes '{needle}'"),
            needle,
        }
    }
}

impl ScenarioCheck for ExcludesText {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_output(&self, agent_output: &str) -> Result<(), String> {
        match agent_output.find(&self.needle) {
            None => Ok(()),
            Some(offset) => Err(format!(
                "agent output contains '{}' at byte {offset}",
                self.needle
            )),
        }
    }
}

/// Agent output must match a regular expression.
#[derive(Debug, Clone)]
pub struct MatchesPattern {
    name: String,
    pattern: Regex,
}

impl MatchesPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: format!("matches /{pattern}/"),
            pattern: Regex::new(pattern)?,
        })
    }
}

impl ScenarioCheck for MatchesPattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_output(&self, agent_output: &str) -> Result<(), String> {
        if self.pattern.is_match(agent_output) {
            Ok(())
        } else {
            Err(format!("agent output does not match /{}/", self.pattern.as_str()))
        }
    }
}

/// A domain must score at least `min` out of 50.
#[derive(Debug, Clone)]
pub struct MinDomainScore {
    name: String,
    domain: Domain,
    min: u32,
}

impl MinDomainScore {
    pub fn new(domain: Domain, min: u32) -> Self {
        Self {
            name: format!("{domain} >= {min}"),
            domain,
            min,
        }
    }
}

impl ScenarioCheck for MinDomainScore {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_judgment(&self, judgment: &JudgmentResult) -> Result<(), String> {
        if judgment.domain != self.domain || judgment.domain_score >= self.min {
            return Ok(());
        }
        Err(format!(
            "{} scored {}, below {}",
            self.domain, judgment.domain_score, self.min
        ))
    }

    fn check_judgments(&self, judgments: &[JudgmentResult]) -> Vec<String> {
        match judgments.iter().find(|j| j.domain == self.domain) {
            Some(judgment) => self.check_judgment(judgment).err().into_iter().collect(),
            None => vec![format!("{} was not judged", self.domain)],
        }
    }
}
