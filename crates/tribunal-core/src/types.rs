//! Shared result types for Tribunal evaluations.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::scenario::slugify;

/// Outcome of reading a judge response against the score grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Every criterion carried a well-formed marker
    Parsed,

    /// Some criteria were missing or malformed and scored 0
    PartiallyParsed,

    /// No usable marker, or no response at all
    Failed,
}

impl ParseStatus {
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseStatus::Parsed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ParseStatus::Failed)
    }
}

/// Why a criterion did not contribute its marker value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseIssue {
    /// No marker for the criterion
    Missing { criterion: String },

    /// Marker present but the value is outside the grammar
    Malformed { criterion: String, value: String },

    /// Marker repeated with different values
    Conflicting { criterion: String, values: Vec<String> },

    /// Marker for a criterion this domain does not have (ignored)
    UnknownCriterion { criterion: String },
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseIssue::Missing { criterion } => write!(f, "{criterion}: no score marker"),
            ParseIssue::Malformed { criterion, value } => {
                write!(f, "{criterion}: malformed score '{value}'")
            }
            ParseIssue::Conflicting { criterion, values } => {
                write!(f, "{criterion}: conflicting scores {}", values.join(", "))
            }
            ParseIssue::UnknownCriterion { criterion } => {
                write!(f, "{criterion}: not a criterion of this domain")
            }
        }
    }
}

/// Why a judge produced no response to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JudgeFailure {
    /// The rubric for the domain could not be loaded
    RubricUnavailable(String),

    /// The judge invocation failed (non-zero exit, empty output)
    Invocation(String),

    /// The judge exceeded its per-judge timeout
    Timeout(String),

    /// The panel's global deadline elapsed before the judge finished
    Cancelled,

    /// The judge worker crashed
    WorkerCrashed(String),
}

impl fmt::Display for JudgeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeFailure::RubricUnavailable(e) => write!(f, "rubric unavailable: {e}"),
            JudgeFailure::Invocation(e) => write!(f, "invocation failed: {e}"),
            JudgeFailure::Timeout(e) => write!(f, "timed out: {e}"),
            JudgeFailure::Cancelled => f.write_str("cancelled by global deadline"),
            JudgeFailure::WorkerCrashed(e) => write!(f, "worker crashed: {e}"),
        }
    }
}

/// One judge's scored view of the agent output for a single domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentResult {
    pub domain: Domain,

    /// Raw judge response text (empty when the judge never answered)
    pub raw_response: String,

    /// Criterion id -> score (0-10); every criterion of the domain is present
    pub criteria_scores: BTreeMap<String, u32>,

    /// Sum of `criteria_scores` (0-50)
    pub domain_score: u32,

    pub parse_status: ParseStatus,

    /// Parser diagnostics, in criterion order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ParseIssue>,

    /// Set when the judge itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JudgeFailure>,
}

impl JudgmentResult {
    /// A `Failed` judgment scoring zero on every criterion.
    pub fn failed(domain: Domain, raw_response: impl Into<String>, failure: JudgeFailure) -> Self {
        Self {
            domain,
            raw_response: raw_response.into(),
            criteria_scores: zero_scores(domain),
            domain_score: 0,
            parse_status: ParseStatus::Failed,
            issues: Vec::new(),
            failure: Some(failure),
        }
    }
}

pub(crate) fn zero_scores(domain: Domain) -> BTreeMap<String, u32> {
    domain
        .criteria()
        .iter()
        .map(|c| (c.id.to_string(), 0))
        .collect()
}

/// Identifier of one evaluation run.
///
/// Formatted as `<UTC timestamp>-<scenario slug>`, e.g.
/// `20261019T142530123Z-refactor-parser`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    id: String,
    started_at: DateTime<Utc>,
}

impl RunId {
    pub fn new(started_at: DateTime<Utc>, scenario_name: &str) -> Self {
        Self {
            id: format!(
                "{}-{}",
                started_at.format("%Y%m%dT%H%M%S%3fZ"),
                slugify(scenario_name)
            ),
            started_at,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Aggregated verdict for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub per_domain_scores: BTreeMap<Domain, u32>,
    pub total_score: u32,
    pub max_score: u32,
    pub passed: bool,

    /// Some domain failed, was only partially parsed, or never reported
    pub degraded: bool,

    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
}

impl AggregateResult {
    /// Score as a percentage of the maximum.
    pub fn percentage(&self) -> f64 {
        if self.max_score == 0 {
            return 0.0;
        }
        f64::from(self.total_score) * 100.0 / f64::from(self.max_score)
    }

    pub fn verdict_label(&self) -> &'static str {
        if self.passed {
            "PASS"
        } else {
            "FAIL"
        }
    }
}
