//! Evaluation domains and their scoring criteria.
//!
//! Every domain is judged independently against exactly five criteria, each
//! scored 0–10, so a domain contributes at most [`DOMAIN_MAX_SCORE`] points.
//!
//! | Domain | Criteria |
//! |--------|----------|
//! | `correctness` | requirements_coverage, logic_soundness, edge_case_handling, error_handling, interface_fidelity |
//! | `security` | input_validation, secret_handling, access_control, dependency_hygiene, safe_defaults |
//! | `maintainability` | readability, modularity, naming, documentation, idiomatic_style |
//! | `testing` | test_presence, coverage_breadth, assertion_quality, isolation, regression_focus |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum score of a single criterion.
pub const CRITERION_MAX_SCORE: u32 = 10;

/// Number of criteria in every domain rubric.
pub const CRITERIA_PER_DOMAIN: usize = 5;

/// Maximum score of a single domain (5 criteria x 10).
pub const DOMAIN_MAX_SCORE: u32 = CRITERION_MAX_SCORE * CRITERIA_PER_DOMAIN as u32;

/// One scored criterion of a domain rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    /// Marker id the judge must emit (`SCORE <id>: N/10`)
    pub id: &'static str,

    /// What the judge is asked to assess
    pub description: &'static str,
}

/// An evaluation dimension scored by one judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Correctness,
    Security,
    Maintainability,
    Testing,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown domain: '{0}'")]
pub struct UnknownDomain(pub String);

const CORRECTNESS_CRITERIA: [Criterion; CRITERIA_PER_DOMAIN] = [
    Criterion {
        id: "requirements_coverage",
        description: "Every stated requirement of the task is addressed",
    },
    Criterion {
        id: "logic_soundness",
        description: "The implemented logic does what it claims to do",
    },
    Criterion {
        id: "edge_case_handling",
        description: "Boundary and degenerate inputs are handled deliberately",
    },
    Criterion {
        id: "error_handling",
        description: "Failures are surfaced or recovered, never silently swallowed",
    },
    Criterion {
        id: "interface_fidelity",
        description: "Public interfaces match the requested signatures and contracts",
    },
];

const SECURITY_CRITERIA: [Criterion; CRITERIA_PER_DOMAIN] = [
    Criterion {
        id: "input_validation",
        description: "Untrusted input is validated before use",
    },
    Criterion {
        id: "secret_handling",
        description: "Credentials and secrets are never hard-coded or logged",
    },
    Criterion {
        id: "access_control",
        description: "Privileged operations are guarded by explicit checks",
    },
    Criterion {
        id: "dependency_hygiene",
        description: "Dependencies are necessary, maintained and pinned sensibly",
    },
    Criterion {
        id: "safe_defaults",
        description: "Defaults fail closed and avoid dangerous behaviour",
    },
];

const MAINTAINABILITY_CRITERIA: [Criterion; CRITERIA_PER_DOMAIN] = [
    Criterion {
        id: "readability",
        description: "Code can be followed without reverse engineering",
    },
    Criterion {
        id: "modularity",
        description: "Responsibilities are separated into cohesive units",
    },
    Criterion {
        id: "naming",
        description: "Names describe intent and match domain vocabulary",
    },
    Criterion {
        id: "documentation",
        description: "Non-obvious behaviour and public APIs are documented",
    },
    Criterion {
        id: "idiomatic_style",
        description: "The code follows the conventions of its language and project",
    },
];

const TESTING_CRITERIA: [Criterion; CRITERIA_PER_DOMAIN] = [
    Criterion {
        id: "test_presence",
        description: "New behaviour ships with tests",
    },
    Criterion {
        id: "coverage_breadth",
        description: "Tests exercise success, failure and edge paths",
    },
    Criterion {
        id: "assertion_quality",
        description: "Assertions check observable behaviour precisely",
    },
    Criterion {
        id: "isolation",
        description: "Tests are deterministic and independent of each other",
    },
    Criterion {
        id: "regression_focus",
        description: "Fixed defects are pinned by a regression test",
    },
];

impl Domain {
    /// The default domain set, in canonical order.
    pub const ALL: [Domain; 4] = [
        Domain::Correctness,
        Domain::Security,
        Domain::Maintainability,
        Domain::Testing,
    ];

    /// Stable identifier used in file names, markers and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Correctness => "correctness",
            Domain::Security => "security",
            Domain::Maintainability => "maintainability",
            Domain::Testing => "testing",
        }
    }

    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            Domain::Correctness => "Correctness",
            Domain::Security => "Security",
            Domain::Maintainability => "Maintainability",
            Domain::Testing => "Testing",
        }
    }

    /// The five criteria of this domain's rubric.
    pub fn criteria(&self) -> &'static [Criterion; CRITERIA_PER_DOMAIN] {
        match self {
            Domain::Correctness => &CORRECTNESS_CRITERIA,
            Domain::Security => &SECURITY_CRITERIA,
            Domain::Maintainability => &MAINTAINABILITY_CRITERIA,
            Domain::Testing => &TESTING_CRITERIA,
        }
    }

    /// Look up a criterion by marker id (case-insensitive).
    pub fn criterion(&self, id: &str) -> Option<&'static Criterion> {
        self.criteria()
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(id))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownDomain(s.to_string()))
    }
}
