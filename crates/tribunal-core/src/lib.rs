//! # tribunal-core
//!
//! Deterministic scoring for LLM-judged evaluations of agent output.
//!
//! This crate answers, without any I/O or LLM calls:
//! - What did each judge score, criterion by criterion?
//! - What is the total, and does it clear the pass threshold?
//! - Which scenarios are we running, and what verdict do we expect?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same judge text always parses to the same score
//! 2. **Never aborts on bad judge output**: malformed markers score 0
//! 3. **Order-independent**: aggregation ignores judgment arrival order
//! 4. **Auditable**: every parse issue is recorded on the judgment
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use tribunal_core::{Domain, RunId, ScoreAggregator, ScoringParser};
//!
//! let parser = ScoringParser::new();
//! let judgments: Vec<_> = Domain::ALL
//!     .iter()
//!     .map(|d| {
//!         let text: String = d
//!             .criteria()
//!             .iter()
//!             .map(|c| format!("SCORE {}: 9/10\n", c.id))
//!             .collect();
//!         parser.parse(*d, &text)
//!     })
//!     .collect();
//!
//! let aggregator = ScoreAggregator::new(&Domain::ALL).unwrap();
//! let result = aggregator
//!     .aggregate(&RunId::new(Utc::now(), "doc example"), &judgments)
//!     .unwrap();
//! assert_eq!(result.total_score, 180);
//! assert!(result.passed);
//! ```

pub mod aggregator;
pub mod domain;
pub mod scenario;
pub mod schema;
pub mod scoring;
pub mod summary;
pub mod types;

pub use aggregator::{AggregateError, ScoreAggregator, DEFAULT_PASS_THRESHOLD_PERCENT};
pub use domain::{Criterion, Domain, UnknownDomain, DOMAIN_MAX_SCORE};
pub use scenario::{slugify, ScenarioDefinition, ScenarioError, ScenarioSuite};
pub use scoring::{ScoringParser, GRAMMAR_VERSION};
pub use summary::render_summary;
pub use types::{
    AggregateResult, JudgeFailure, JudgmentResult, ParseIssue, ParseStatus, RunId,
};
