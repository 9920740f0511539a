//! Deterministic judge response parser.

use std::collections::BTreeMap;

use crate::domain::{Domain, CRITERIA_PER_DOMAIN};
use crate::types::{JudgmentResult, ParseIssue, ParseStatus};

use super::grammar::{find_markers, parse_value, RawMarker};

/// Turns a judge response into a [`JudgmentResult`].
///
/// Parsing never fails: missing, malformed or conflicting markers score the
/// affected criterion 0 and downgrade the status. The same text always
/// produces the same result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringParser;

impl ScoringParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `response` against the rubric of `domain`.
    pub fn parse(&self, domain: Domain, response: &str) -> JudgmentResult {
        let markers = find_markers(response);

        let mut criteria_scores = BTreeMap::new();
        let mut issues = Vec::new();
        let mut well_formed = 0usize;

        for criterion in domain.criteria() {
            let values: Vec<&RawMarker> = markers
                .iter()
                .filter(|m| m.criterion == criterion.id)
                .collect();

            let score = match read_criterion(criterion.id, &values) {
                Ok(score) => {
                    well_formed += 1;
                    score
                }
                Err(issue) => {
                    issues.push(issue);
                    0
                }
            };
            criteria_scores.insert(criterion.id.to_string(), score);
        }

        let mut unknown: Vec<&str> = Vec::new();
        for marker in &markers {
            if domain.criterion(&marker.criterion).is_none()
                && !unknown.contains(&marker.criterion.as_str())
            {
                unknown.push(&marker.criterion);
            }
        }
        issues.extend(unknown.into_iter().map(|c| ParseIssue::UnknownCriterion {
            criterion: c.to_string(),
        }));

        let parse_status = match well_formed {
            CRITERIA_PER_DOMAIN => ParseStatus::Parsed,
            0 => ParseStatus::Failed,
            _ => ParseStatus::PartiallyParsed,
        };

        if parse_status != ParseStatus::Parsed {
            tracing::debug!(
                domain = %domain,
                status = ?parse_status,
                issues = issues.len(),
                "Judge response not fully parsed"
            );
        }

        let domain_score = criteria_scores.values().sum();

        JudgmentResult {
            domain,
            raw_response: response.to_string(),
            criteria_scores,
            domain_score,
            parse_status,
            issues,
            failure: None,
        }
    }
}

/// Resolve all markers of one criterion to a single score.
fn read_criterion(criterion: &str, markers: &[&RawMarker]) -> Result<u32, ParseIssue> {
    let Some(first) = markers.first() else {
        return Err(ParseIssue::Missing {
            criterion: criterion.to_string(),
        });
    };

    let readings: Vec<Option<u32>> = markers.iter().map(|m| parse_value(&m.value)).collect();
    let first_reading = readings[0];

    if readings.iter().any(|r| *r != first_reading) {
        let mut values: Vec<String> = Vec::new();
        for m in markers {
            if !values.contains(&m.value) {
                values.push(m.value.clone());
            }
        }
        return Err(ParseIssue::Conflicting {
            criterion: criterion.to_string(),
            values,
        });
    }

    first_reading.ok_or_else(|| ParseIssue::Malformed {
        criterion: criterion.to_string(),
        value: first.value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn full_response(domain: Domain, score: u32) -> String {
        let mut text = String::from("## Review\nThe change looks reasonable.\n\n");
        for c in domain.criteria() {
            text.push_str(&format!("SCORE {}: {}/10\n", c.id, score));
        }
        text
    }

    #[test]
    fn test_all_markers_parsed() {
        let parser = ScoringParser::new();
        let result = parser.parse(Domain::Correctness, &full_response(Domain::Correctness, 9));

        assert_eq!(result.parse_status, ParseStatus::Parsed);
        assert_eq!(result.domain_score, 45);
        assert!(result.issues.is_empty());
        assert!(result.failure.is_none());
    }

    #[test]
    fn test_missing_marker_is_partial() {
        let text = "\
SCORE readability: 8/10
SCORE modularity: 7/10
SCORE naming: 9/10
SCORE documentation: 6/10
";
        let result = ScoringParser::new().parse(Domain::Maintainability, text);

        assert_eq!(result.parse_status, ParseStatus::PartiallyParsed);
        assert_eq!(result.domain_score, 30);
        assert_eq!(result.criteria_scores["idiomatic_style"], 0);
        assert_eq!(
            result.issues,
            vec![ParseIssue::Missing {
                criterion: "idiomatic_style".into()
            }]
        );
    }

    #[test]
    fn test_prose_score_is_malformed() {
        let text = "\
SCORE test_presence: approximately 8/10
SCORE coverage_breadth: 7/10
SCORE assertion_quality: 7/10
SCORE isolation: 7/10
SCORE regression_focus: 7/10
";
        let result = ScoringParser::new().parse(Domain::Testing, text);

        assert_eq!(result.parse_status, ParseStatus::PartiallyParsed);
        assert_eq!(result.criteria_scores["test_presence"], 0);
        assert_eq!(result.domain_score, 28);
        assert!(matches!(result.issues[0], ParseIssue::Malformed { .. }));
    }

    #[test]
    fn test_conflicting_markers_score_zero() {
        let mut text = full_response(Domain::Security, 5);
        text.push_str("SCORE safe_defaults: 9/10\n");
        let result = ScoringParser::new().parse(Domain::Security, &text);

        assert_eq!(result.criteria_scores["safe_defaults"], 0);
        assert_eq!(result.domain_score, 20);
        assert_eq!(
            result.issues,
            vec![ParseIssue::Conflicting {
                criterion: "safe_defaults".into(),
                values: vec!["5/10".into(), "9/10".into()],
            }]
        );
    }

    #[test]
    fn test_identical_repeat_is_accepted() {
        let mut text = full_response(Domain::Security, 5);
        text.push_str("SCORE safe_defaults: 5 / 10\n");
        let result = ScoringParser::new().parse(Domain::Security, &text);

        assert_eq!(result.parse_status, ParseStatus::Parsed);
        assert_eq!(result.domain_score, 25);
    }

    #[test]
    fn test_no_markers_fails() {
        let result = ScoringParser::new().parse(Domain::Correctness, "Looks great, 10/10!");

        assert_eq!(result.parse_status, ParseStatus::Failed);
        assert_eq!(result.domain_score, 0);
        assert_eq!(result.issues.len(), 5);
        assert_eq!(result.raw_response, "Looks great, 10/10!");
    }

    #[test]
    fn test_unknown_criterion_does_not_downgrade() {
        let mut text = full_response(Domain::Testing, 8);
        text.push_str("SCORE vibes: 10/10\nSCORE vibes: 10/10\n");
        let result = ScoringParser::new().parse(Domain::Testing, &text);

        assert_eq!(result.parse_status, ParseStatus::Parsed);
        assert_eq!(
            result.issues,
            vec![ParseIssue::UnknownCriterion {
                criterion: "vibes".into()
            }]
        );
    }

    #[test]
    fn test_markers_for_other_domain_do_not_count() {
        let text = full_response(Domain::Security, 10);
        let result = ScoringParser::new().parse(Domain::Testing, &text);

        assert_eq!(result.parse_status, ParseStatus::Failed);
        assert_eq!(result.domain_score, 0);
    }

    proptest! {
        #[test]
        fn prop_parse_is_deterministic(text in ".{0,400}") {
            let parser = ScoringParser::new();
            for domain in Domain::ALL {
                prop_assert_eq!(parser.parse(domain, &text), parser.parse(domain, &text));
            }
        }

        #[test]
        fn prop_domain_score_is_sum_in_range(scores in proptest::collection::vec(0u32..=10, 5)) {
            let domain = Domain::Maintainability;
            let text: String = domain
                .criteria()
                .iter()
                .zip(&scores)
                .map(|(c, s)| format!("- SCORE {}: {}/10\n", c.id, s))
                .collect();
            let result = ScoringParser::new().parse(domain, &text);

            prop_assert_eq!(result.parse_status, ParseStatus::Parsed);
            prop_assert_eq!(result.domain_score, scores.iter().sum::<u32>());
            prop_assert!(result.domain_score <= 50);
        }
    }
}
