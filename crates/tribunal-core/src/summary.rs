//! Human-readable run summaries.

use std::fmt::Write;

use crate::domain::DOMAIN_MAX_SCORE;
use crate::scoring::GRAMMAR_VERSION;
use crate::types::{AggregateResult, JudgmentResult, ParseStatus};

/// Render a markdown summary of one run.
///
/// Domains are listed in canonical order regardless of the order judgments
/// were collected in.
pub fn render_summary(
    scenario_name: &str,
    judgments: &[JudgmentResult],
    aggregate: &AggregateResult,
) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# {scenario_name}");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Run: `{}`", aggregate.run_id);
    let _ = writeln!(out, "- Timestamp: {}", aggregate.timestamp.to_rfc3339());
    let _ = writeln!(
        out,
        "- Verdict: **{}** ({}/{}, {:.1}%)",
        aggregate.verdict_label(),
        aggregate.total_score,
        aggregate.max_score,
        aggregate.percentage()
    );
    if aggregate.degraded {
        let _ = writeln!(
            out,
            "- Degraded: at least one judge failed or was only partially parsed"
        );
    }
    let _ = writeln!(out, "- Score grammar: v{GRAMMAR_VERSION}");
    let _ = writeln!(out);

    let _ = writeln!(out, "## Domains");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Domain | Score | Status |");
    let _ = writeln!(out, "|--------|-------|--------|");
    for (domain, score) in &aggregate.per_domain_scores {
        let status = judgments
            .iter()
            .find(|j| j.domain == *domain)
            .map(|j| status_label(j.parse_status))
            .unwrap_or("missing");
        let _ = writeln!(
            out,
            "| {} | {}/{} | {} |",
            domain.title(),
            score,
            DOMAIN_MAX_SCORE,
            status
        );
    }

    let mut ordered: Vec<&JudgmentResult> = judgments.iter().collect();
    ordered.sort_by_key(|j| j.domain);

    for judgment in ordered {
        let _ = writeln!(out);
        let _ = writeln!(out, "### {}", judgment.domain.title());
        let _ = writeln!(out);
        if let Some(failure) = &judgment.failure {
            let _ = writeln!(out, "Judge failed: {failure}");
            continue;
        }
        for (criterion, score) in &judgment.criteria_scores {
            let _ = writeln!(out, "- {criterion}: {score}/10");
        }
        if !judgment.issues.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Parse issues:");
            for issue in &judgment.issues {
                let _ = writeln!(out, "- {issue}");
            }
        }
    }

    out
}

fn status_label(status: ParseStatus) -> &'static str {
    match status {
        ParseStatus::Parsed => "parsed",
        ParseStatus::PartiallyParsed => "partial",
        ParseStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ScoreAggregator;
    use crate::domain::Domain;
    use crate::scoring::ScoringParser;
    use crate::types::{JudgeFailure, RunId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_summary_lists_every_domain() {
        let parser = ScoringParser::new();
        let judgments = vec![
            JudgmentResult::failed(Domain::Testing, "", JudgeFailure::Cancelled),
            parser.parse(Domain::Security, "SCORE secret_handling: 4/10"),
            parser.parse(Domain::Correctness, "SCORE logic_soundness: 9/10"),
            parser.parse(Domain::Maintainability, "SCORE naming: 8/10"),
        ];
        let run_id = RunId::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(), "demo");
        let aggregate = ScoreAggregator::new(&Domain::ALL)
            .unwrap()
            .aggregate(&run_id, &judgments)
            .unwrap();

        let summary = render_summary("demo", &judgments, &aggregate);

        assert!(summary.starts_with("# demo"));
        assert!(summary.contains("**FAIL** (21/200"));
        assert!(summary.contains("| Testing | 0/50 | failed |"));
        assert!(summary.contains("| Security | 4/50 | partial |"));
        assert!(summary.contains("Judge failed: cancelled by global deadline"));
        assert!(summary.contains("Degraded"));
        let correctness = summary.find("### Correctness").unwrap();
        let testing = summary.find("### Testing").unwrap();
        assert!(correctness < testing);
    }
}
