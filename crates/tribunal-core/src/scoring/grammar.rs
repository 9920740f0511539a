//! Score marker grammar, version 1.
//!
//! A marker occupies one line of the judge response:
//!
//! ```text
//! SCORE logic_soundness: 8/10
//! - SCORE naming: 7 / 10
//! **SCORE readability:** 9/10
//! ```
//!
//! - The `SCORE` keyword and criterion id are case-insensitive.
//! - An optional list bullet (`-`, `*`, `+`) and optional bold markup around
//!   `SCORE <id>:` are allowed.
//! - The value must be the whole remainder of the line: an integer 0..=10,
//!   a slash and the literal denominator `10`.
//!
//! Anything else after the colon ("approximately 8/10", "8", "11/10",
//! "4/5") is malformed. The grammar never guesses intent.

use lazy_static::lazy_static;
use regex::Regex;

/// Version of the accepted marker grammar.
pub const GRAMMAR_VERSION: u32 = 1;

/// Denominator every marker value must carry.
pub const SCORE_DENOMINATOR: u32 = 10;

lazy_static! {
    /// One marker line: captures criterion id and raw value text.
    pub static ref MARKER_LINE: Regex = Regex::new(
        r"(?im)^[ \t]*(?:[-*+][ \t]+)?(?:\*\*)?SCORE[ \t]+([A-Za-z0-9_]+)[ \t]*:(?:\*\*)?[ \t]*(.*)$"
    ).unwrap();

    /// A well-formed marker value.
    pub static ref MARKER_VALUE: Regex = Regex::new(
        r"^(\d{1,2})[ \t]*/[ \t]*10$"
    ).unwrap();
}

/// A marker found in a response, before validation against a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarker {
    /// Criterion id, lowercased
    pub criterion: String,

    /// Value text after the colon, trimmed
    pub value: String,
}

/// Find every marker line, in document order.
pub fn find_markers(text: &str) -> Vec<RawMarker> {
    MARKER_LINE
        .captures_iter(text)
        .map(|caps| RawMarker {
            criterion: caps[1].to_ascii_lowercase(),
            value: caps[2].trim().to_string(),
        })
        .collect()
}

/// Read a marker value; `None` when it falls outside the grammar.
pub fn parse_value(value: &str) -> Option<u32> {
    let caps = MARKER_VALUE.captures(value)?;
    let score: u32 = caps[1].parse().ok()?;
    (score <= SCORE_DENOMINATOR).then_some(score)
}

/// Render a well-formed marker line.
pub fn format_marker(criterion: &str, score: u32) -> String {
    format!("SCORE {criterion}: {score}/{SCORE_DENOMINATOR}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_marker() {
        let markers = find_markers("Review\nSCORE logic_soundness: 8/10\nDone");
        assert_eq!(
            markers,
            vec![RawMarker {
                criterion: "logic_soundness".into(),
                value: "8/10".into()
            }]
        );
    }

    #[test]
    fn test_bullets_bold_and_case() {
        let text = "- score Naming: 7 / 10\n**SCORE readability:** 9/10\r\n* SCORE modularity:10/10";
        let markers = find_markers(text);
        assert_eq!(markers.len(), 3);
        assert_eq!(markers[0].criterion, "naming");
        assert_eq!(parse_value(&markers[0].value), Some(7));
        assert_eq!(parse_value(&markers[1].value), Some(9));
        assert_eq!(parse_value(&markers[2].value), Some(10));
    }

    #[test]
    fn test_marker_must_start_line() {
        assert!(find_markers("The SCORE naming: 7/10 is inline").is_empty());
    }

    #[test]
    fn test_values_outside_grammar() {
        assert_eq!(parse_value("approximately 8/10"), None);
        assert_eq!(parse_value("8"), None);
        assert_eq!(parse_value("11/10"), None);
        assert_eq!(parse_value("4/5"), None);
        assert_eq!(parse_value("8/10 (good)"), None);
        assert_eq!(parse_value("-1/10"), None);
        assert_eq!(parse_value("0/10"), Some(0));
    }

    #[test]
    fn test_format_marker_is_parseable() {
        let line = format_marker("isolation", 6);
        let markers = find_markers(&line);
        assert_eq!(parse_value(&markers[0].value), Some(6));
    }
}
