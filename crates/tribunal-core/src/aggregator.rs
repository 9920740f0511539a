//! Aggregator: reduces per-domain judgments into a verdict.
//!
//! The reduction is fixed:
//! 1. `total_score` is the sum of every domain score
//! 2. `max_score` is 50 x the number of configured domains
//! 3. `passed` iff `total_score >= threshold% of max_score`
//! 4. `degraded` iff any domain is not fully parsed or never reported
//!
//! The result does not depend on the order judgments arrive in.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::{Domain, DOMAIN_MAX_SCORE};
use crate::types::{AggregateResult, JudgmentResult, RunId};

/// Default pass threshold, in percent of the maximum score.
pub const DEFAULT_PASS_THRESHOLD_PERCENT: u32 = 70;

/// Errors from aggregation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("All {domains} judges failed; no verdict can be derived")]
    AllJudgesFailed { domains: usize },

    #[error("Judgment for unconfigured domain: {0}")]
    UnexpectedDomain(Domain),

    #[error("More than one judgment for domain: {0}")]
    DuplicateDomain(Domain),

    #[error("No domains configured")]
    NoDomains,

    #[error("Pass threshold must be within 1..=100, got {0}")]
    InvalidThreshold(u32),
}

/// Deterministic score aggregator for a fixed set of domains.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    domains: Vec<Domain>,
    pass_threshold_percent: u32,
}

impl ScoreAggregator {
    /// Create an aggregator for `domains` with the default 70% threshold.
    pub fn new(domains: &[Domain]) -> Result<Self, AggregateError> {
        Self::with_threshold(domains, DEFAULT_PASS_THRESHOLD_PERCENT)
    }

    /// Create an aggregator with a custom pass threshold.
    pub fn with_threshold(
        domains: &[Domain],
        pass_threshold_percent: u32,
    ) -> Result<Self, AggregateError> {
        if domains.is_empty() {
            return Err(AggregateError::NoDomains);
        }
        if !(1..=100).contains(&pass_threshold_percent) {
            return Err(AggregateError::InvalidThreshold(pass_threshold_percent));
        }

        let mut domains = domains.to_vec();
        domains.sort();
        domains.dedup();

        Ok(Self {
            domains,
            pass_threshold_percent,
        })
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Maximum attainable total for the configured domains.
    pub fn max_score(&self) -> u32 {
        DOMAIN_MAX_SCORE * self.domains.len() as u32
    }

    /// Whether `total` clears the threshold against `max`.
    ///
    /// Integer arithmetic: `total * 100 >= max * threshold`.
    pub fn passes(&self, total: u32, max: u32) -> bool {
        u64::from(total) * 100 >= u64::from(max) * u64::from(self.pass_threshold_percent)
    }

    /// Aggregate judgments for one run.
    ///
    /// # Errors
    ///
    /// - `AllJudgesFailed` when no judgment carries any usable score
    /// - `UnexpectedDomain` / `DuplicateDomain` when the judgment set does not
    ///   match the configured domains
    pub fn aggregate(
        &self,
        run_id: &RunId,
        judgments: &[JudgmentResult],
    ) -> Result<AggregateResult, AggregateError> {
        let mut per_domain_scores: BTreeMap<Domain, u32> = BTreeMap::new();
        let mut degraded = false;

        for judgment in judgments {
            if !self.domains.contains(&judgment.domain) {
                return Err(AggregateError::UnexpectedDomain(judgment.domain));
            }
            let score = judgment.domain_score.min(DOMAIN_MAX_SCORE);
            if per_domain_scores.insert(judgment.domain, score).is_some() {
                return Err(AggregateError::DuplicateDomain(judgment.domain));
            }
            degraded |= !judgment.parse_status.is_parsed();
        }

        if judgments.iter().all(|j| j.parse_status.is_failed()) {
            return Err(AggregateError::AllJudgesFailed {
                domains: self.domains.len(),
            });
        }

        for domain in &self.domains {
            if !per_domain_scores.contains_key(domain) {
                tracing::warn!(domain = %domain, "No judgment for configured domain, scoring 0");
                per_domain_scores.insert(*domain, 0);
                degraded = true;
            }
        }

        let total_score: u32 = per_domain_scores.values().sum();
        let max_score = self.max_score();

        Ok(AggregateResult {
            passed: self.passes(total_score, max_score),
            per_domain_scores,
            total_score,
            max_score,
            degraded,
            run_id: run_id.clone(),
            timestamp: run_id.started_at(),
        })
    }

    /// Verdict recorded for a run whose judges all failed: every configured
    /// domain scores 0, the run fails and is degraded.
    pub fn failed_result(&self, run_id: &RunId) -> AggregateResult {
        AggregateResult {
            per_domain_scores: self.domains.iter().map(|d| (*d, 0)).collect(),
            total_score: 0,
            max_score: self.max_score(),
            passed: false,
            degraded: true,
            run_id: run_id.clone(),
            timestamp: run_id.started_at(),
        }
    }
}
