//! Rubric sources.
//!
//! Rubrics are read-only configuration: the panel loads one per domain at
//! the start of every run and never writes them back.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tribunal_core::Domain;

/// Errors from loading a rubric.
#[derive(Error, Debug)]
pub enum RubricError {
    #[error("Rubric for {domain} not found at {path}")]
    NotFound { domain: Domain, path: PathBuf },

    #[error("Failed to read rubric for {domain} from {path}: {source}")]
    Io {
        domain: Domain,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rubric for {0} is empty")]
    Empty(Domain),
}

/// Rubric text for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    pub domain: Domain,
    pub text: String,
}

/// Where rubric text comes from.
pub trait RubricSource: Send + Sync {
    fn load(&self, domain: Domain) -> Result<Rubric, RubricError>;
}

/// Rubrics compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRubrics;

impl BuiltinRubrics {
    pub fn text(domain: Domain) -> &'static str {
        match domain {
            Domain::Correctness => CORRECTNESS_RUBRIC,
            Domain::Security => SECURITY_RUBRIC,
            Domain::Maintainability => MAINTAINABILITY_RUBRIC,
            Domain::Testing => TESTING_RUBRIC,
        }
    }
}

impl RubricSource for BuiltinRubrics {
    fn load(&self, domain: Domain) -> Result<Rubric, RubricError> {
        Ok(Rubric {
            domain,
            text: Self::text(domain).trim().to_string(),
        })
    }
}

/// Rubrics read from `<dir>/<domain>.md`.
///
/// Files are re-read on every load, so edits apply to the next run.
#[derive(Debug, Clone)]
pub struct DirectoryRubrics {
    dir: PathBuf,
}

impl DirectoryRubrics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, domain: Domain) -> PathBuf {
        self.dir.join(format!("{}.md", domain.as_str()))
    }
}

impl RubricSource for DirectoryRubrics {
    fn load(&self, domain: Domain) -> Result<Rubric, RubricError> {
        let path = self.path_for(domain);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RubricError::NotFound { domain, path });
            }
            Err(source) => {
                return Err(RubricError::Io {
                    domain,
                    path,
                    source,
                })
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(RubricError::Empty(domain));
        }

        Ok(Rubric {
            domain,
            text: text.to_string(),
        })
    }
}

const CORRECTNESS_RUBRIC: &str = r#"
## Domain: Correctness

Question:
Does the output do what the task asked, and does it do it right?

Look for:
- Requirements stated in the task that the output ignores or only half covers
- Logic that contradicts its own comments, names, or tests
- Boundary inputs (empty, zero, maximum, malformed) that are not handled
- Errors that are swallowed, mislabelled, or turned into panics
- Public signatures or formats that differ from what callers were promised
"#;

const SECURITY_RUBRIC: &str = r#"
## Domain: Security

Question:
Could the output be abused, or does it leak what it should protect?

Look for:
- Untrusted input reaching queries, shells, paths, or parsers unchecked
- Credentials or tokens hard-coded, logged, or echoed in errors
- Missing or bypassable authorization checks
- New dependencies that are unmaintained, unpinned, or unnecessary
- Defaults that are permissive when they could be strict
"#;

const MAINTAINABILITY_RUBRIC: &str = r#"
## Domain: Maintainability

Question:
Will the next engineer be able to change this output safely?

Look for:
- Long functions, deep nesting, or control flow that is hard to follow
- Responsibilities mixed in one unit that belong apart
- Names that mislead or say nothing
- Public items without documentation where intent is not obvious
- Code that fights the conventions of its language and codebase
"#;

const TESTING_RUBRIC: &str = r#"
## Domain: Testing

Question:
Would the tests catch this output breaking?

Look for:
- Changed behavior with no test at all
- Only the happy path covered; no error or boundary cases
- Assertions that cannot fail or check the wrong thing
- Tests that depend on order, wall-clock time, network, or shared state
- Fixed defects without a test reproducing them
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rubrics_cover_every_domain() {
        for domain in Domain::ALL {
            let rubric = BuiltinRubrics.load(domain).unwrap();
            assert_eq!(rubric.domain, domain);
            assert!(rubric.text.contains(domain.title()));
        }
    }

    #[test]
    fn test_directory_rubric_is_read_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryRubrics::new(dir.path());
        let path = source.path_for(Domain::Security);

        std::fs::write(&path, "first version\n").unwrap();
        assert_eq!(source.load(Domain::Security).unwrap().text, "first version");

        std::fs::write(&path, "second version\n").unwrap();
        assert_eq!(source.load(Domain::Security).unwrap().text, "second version");
    }

    #[test]
    fn test_directory_rubric_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryRubrics::new(dir.path());

        let err = source.load(Domain::Testing).unwrap_err();
        assert!(matches!(err, RubricError::NotFound { domain: Domain::Testing, .. }));
        assert!(err.to_string().contains("testing.md"));
    }

    #[test]
    fn test_directory_rubric_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryRubrics::new(dir.path());
        std::fs::write(source.path_for(Domain::Correctness), "  \n").unwrap();

        assert!(matches!(
            source.load(Domain::Correctness),
            Err(RubricError::Empty(Domain::Correctness))
        ));
    }
}
