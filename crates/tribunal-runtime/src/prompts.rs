//! Judge prompts.
//!
//! A judge prompt is assembled from three parts:
//! 1. The shared judge instructions
//! 2. The domain rubric and its criteria, with the exact markers to emit
//! 3. The agent output under review

use std::fmt::Write;

use tribunal_core::scoring::grammar::{format_marker, SCORE_DENOMINATOR};
use tribunal_core::Domain;

use crate::rubric::Rubric;

/// Instructions shared by every judge.
///
/// The judge reviews one domain only and reports through score markers; the
/// parser ignores everything else it writes.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"
You are a Domain Judge reviewing the output of an autonomous development agent.

Your role is to score the output against ONE domain rubric.
You do not score other domains.
You do not invent criteria.
You have no visibility into other judges or their scores.

## Scoring Rules
1. Score every listed criterion with an integer from 0 to 10
2. Emit each score on its own line, exactly as shown: SCORE <criterion>: N/10
3. Emit each criterion once; never revise a score with a second marker
4. Write any reasoning you like around the markers; only the markers are scored
5. If the output gives you nothing to assess for a criterion, score it 0

## Calibration
- 9-10: Exemplary, nothing to improve
- 7-8: Solid, minor issues
- 4-6: Noticeable problems a reviewer would block on
- 1-3: Mostly missing or wrong
- 0: Absent or not assessable
"#;

/// Line that names the domain under review; stable so harness logs and
/// scripted invokers can recognise which judge a prompt is for.
pub fn domain_header(domain: Domain) -> String {
    format!("Domain under review: {}", domain.as_str())
}

/// Build the full prompt for one domain judge.
pub fn build_judge_prompt(rubric: &Rubric, agent_output: &str) -> String {
    let domain = rubric.domain;
    let mut prompt = String::with_capacity(
        JUDGE_SYSTEM_PROMPT.len() + rubric.text.len() + agent_output.len() + 512,
    );

    prompt.push_str(JUDGE_SYSTEM_PROMPT.trim());
    prompt.push_str("\n\n");
    let _ = writeln!(prompt, "{}", domain_header(domain));
    prompt.push('\n');
    prompt.push_str(&rubric.text);
    prompt.push_str("\n\n## Criteria\n\n");
    for criterion in domain.criteria() {
        let _ = writeln!(prompt, "- {}: {}", criterion.id, criterion.description);
    }

    prompt.push_str("\n## Required Markers\n\n");
    for criterion in domain.criteria() {
        let _ = writeln!(prompt, "SCORE {}: N/{}", criterion.id, SCORE_DENOMINATOR);
    }
    let example = domain.criteria()[0].id;
    let _ = writeln!(
        prompt,
        "\nReplace N with your score, for example `{}`.",
        format_marker(example, 7)
    );

    prompt.push_str("\n## Agent Output\n\n<agent_output>\n");
    prompt.push_str(agent_output);
    if !agent_output.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("</agent_output>\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{BuiltinRubrics, RubricSource};

    #[test]
    fn test_prompt_lists_every_marker() {
        for domain in Domain::ALL {
            let rubric = BuiltinRubrics.load(domain).unwrap();
            let prompt = build_judge_prompt(&rubric, "fn main() {}");

            for criterion in domain.criteria() {
                assert!(prompt.contains(&format!("SCORE {}: N/10", criterion.id)));
            }
            assert!(prompt.contains(&domain_header(domain)));
        }
    }

    #[test]
    fn test_agent_output_is_delimited() {
        let rubric = BuiltinRubrics.load(Domain::Testing).unwrap();
        let prompt = build_judge_prompt(&rubric, "line one\nline two");

        assert!(prompt.ends_with("<agent_output>\nline one\nline two\n</agent_output>\n"));
    }

    #[test]
    fn test_prompt_excludes_other_domains() {
        let rubric = BuiltinRubrics.load(Domain::Security).unwrap();
        let prompt = build_judge_prompt(&rubric, "output");

        assert!(!prompt.contains("logic_soundness"));
        assert!(!prompt.contains(&domain_header(Domain::Correctness)));
    }

    #[test]
    fn test_system_prompt_states_marker_format() {
        assert!(JUDGE_SYSTEM_PROMPT.contains("SCORE <criterion>: N/10"));
        assert!(JUDGE_SYSTEM_PROMPT.contains("ONE domain"));
    }
}
