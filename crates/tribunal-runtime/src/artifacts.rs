//! Run artifact persistence.
//!
//! Every run gets its own write-once directory:
//!
//! ```text
//! <root>/runs/<run_id>/agent_output.txt
//! <root>/runs/<run_id>/judges/<domain>.txt
//! <root>/runs/<run_id>/run.json
//! <root>/runs/<run_id>/summary.md
//! <root>/history.log
//! ```
//!
//! `history.log` is the only file shared between runs. Within a process every
//! append goes through one lock, whichever logger makes it. Across processes
//! each line is a single `write_all` on an `O_APPEND` handle.
//!
//! Run ids come from a process-wide clock, so two loggers on the same root
//! never hand out the same id.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tribunal_core::{
    render_summary, AggregateResult, Domain, JudgmentResult, RunId, GRAMMAR_VERSION,
};

const RUNS_DIR: &str = "runs";
const JUDGES_DIR: &str = "judges";
const HISTORY_FILE: &str = "history.log";

/// Timestamp of the last run id handed out by any logger.
static LAST_RUN_AT: Mutex<Option<DateTime<Utc>>> = parking_lot::const_mutex(None);

/// Serializes history appends from every logger in the process.
static HISTORY_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Errors while writing run artifacts. All of them are fatal for the run.
#[derive(Error, Debug)]
pub enum ArtifactWriteError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run directory already exists: {0}")]
    RunExists(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize run artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to append to history log {path}: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while reading artifacts back.
#[derive(Error, Debug)]
pub enum ArtifactReadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid run artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed history line {line}: '{content}'")]
    MalformedHistory { line: usize, content: String },
}

/// Everything recorded about one run, serialized to `run.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: RunId,
    pub scenario_name: String,
    pub agent_output: String,
    pub judge_responses_by_domain: BTreeMap<Domain, String>,
    pub judgments: Vec<JudgmentResult>,
    pub aggregate: AggregateResult,
    pub grammar_version: u32,
}

/// One parsed line of `history.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub scenario: String,
    pub total_score: u32,
    pub max_score: u32,
    pub passed: bool,
    pub degraded: bool,
}

impl HistoryEntry {
    fn from_aggregate(scenario: &str, aggregate: &AggregateResult) -> Self {
        Self {
            timestamp: aggregate.timestamp,
            scenario: scenario.to_string(),
            total_score: aggregate.total_score,
            max_score: aggregate.max_score,
            passed: aggregate.passed,
            degraded: aggregate.degraded,
        }
    }

    /// Render as a single newline-terminated line.
    pub fn to_line(&self) -> String {
        let scenario: String = self
            .scenario
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let mut line = format!(
            "{}\t{}\t{}/{}\t{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            scenario,
            self.total_score,
            self.max_score,
            if self.passed { "PASS" } else { "FAIL" }
        );
        if self.degraded {
            line.push_str("\tdegraded");
        }
        line.push('\n');
        line
    }

    fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let degraded = match fields.len() {
            4 => false,
            5 if fields[4] == "degraded" => true,
            _ => return None,
        };

        let timestamp = DateTime::parse_from_rfc3339(fields[0]).ok()?.with_timezone(&Utc);
        let (total, max) = fields[2].split_once('/')?;
        let passed = match fields[3] {
            "PASS" => true,
            "FAIL" => false,
            _ => return None,
        };

        Some(Self {
            timestamp,
            scenario: fields[1].to_string(),
            total_score: total.parse().ok()?,
            max_score: max.parse().ok()?,
            passed,
            degraded,
        })
    }
}

/// Writes run artifacts and the cumulative history under one root.
#[derive(Debug)]
pub struct ArtifactLogger {
    root: PathBuf,
}

impl ArtifactLogger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id.as_str())
    }

    /// Allocate a run id for `scenario_name`.
    ///
    /// Timestamps have millisecond precision and strictly increase across
    /// every logger in the process, so ids never repeat within a process.
    pub fn next_run_id(&self, scenario_name: &str) -> RunId {
        let now = Utc::now().trunc_subsecs(3);
        let mut last = LAST_RUN_AT.lock();
        let started_at = match *last {
            Some(prev) if now <= prev => prev + chrono::Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(started_at);
        RunId::new(started_at, scenario_name)
    }

    /// Write every artifact for one run and append its history line.
    ///
    /// Returns the run directory.
    pub fn persist(
        &self,
        run_id: &RunId,
        scenario_name: &str,
        agent_output: &str,
        judgments: &[JudgmentResult],
        aggregate: &AggregateResult,
    ) -> Result<PathBuf, ArtifactWriteError> {
        let runs_dir = self.root.join(RUNS_DIR);
        std::fs::create_dir_all(&runs_dir).map_err(|source| ArtifactWriteError::CreateDir {
            path: runs_dir.clone(),
            source,
        })?;

        let run_dir = self.run_dir(run_id);
        match std::fs::create_dir(&run_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ArtifactWriteError::RunExists(run_dir));
            }
            Err(source) => {
                return Err(ArtifactWriteError::CreateDir {
                    path: run_dir,
                    source,
                })
            }
        }

        write_new(&run_dir.join("agent_output.txt"), agent_output.as_bytes())?;

        let judges_dir = run_dir.join(JUDGES_DIR);
        std::fs::create_dir(&judges_dir).map_err(|source| ArtifactWriteError::CreateDir {
            path: judges_dir.clone(),
            source,
        })?;
        for judgment in judgments {
            let path = judges_dir.join(format!("{}.txt", judgment.domain.as_str()));
            write_new(&path, judgment.raw_response.as_bytes())?;
        }

        let artifact = RunArtifact {
            run_id: run_id.clone(),
            scenario_name: scenario_name.to_string(),
            agent_output: agent_output.to_string(),
            judge_responses_by_domain: judgments
                .iter()
                .map(|j| (j.domain, j.raw_response.clone()))
                .collect(),
            judgments: judgments.to_vec(),
            aggregate: aggregate.clone(),
            grammar_version: GRAMMAR_VERSION,
        };
        let json = serde_json::to_vec_pretty(&artifact)?;
        write_new(&run_dir.join("run.json"), &json)?;

        let summary = render_summary(scenario_name, judgments, aggregate);
        write_new(&run_dir.join("summary.md"), summary.as_bytes())?;

        self.append_history(&HistoryEntry::from_aggregate(scenario_name, aggregate))?;

        tracing::info!(
            run_id = %run_id,
            dir = %run_dir.display(),
            "Run artifacts written"
        );
        Ok(run_dir)
    }

    fn append_history(&self, entry: &HistoryEntry) -> Result<(), ArtifactWriteError> {
        let path = self.history_path();
        let line = entry.to_line();

        let _guard = HISTORY_LOCK.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ArtifactWriteError::History {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| ArtifactWriteError::History { path, source })
    }

    /// Read `run.json` of a persisted run.
    pub fn read_artifact(&self, run_id: &RunId) -> Result<RunArtifact, ArtifactReadError> {
        let path = self.run_dir(run_id).join("run.json");
        let json = std::fs::read(&path).map_err(|source| ArtifactReadError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Parse `history.log`; a missing file is an empty history.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, ArtifactReadError> {
        let path = self.history_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ArtifactReadError::Io { path, source }),
        };

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                HistoryEntry::parse_line(line).ok_or_else(|| ArtifactReadError::MalformedHistory {
                    line: i + 1,
                    content: line.to_string(),
                })
            })
            .collect()
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> Result<(), ArtifactWriteError> {
    let to_err = |source| ArtifactWriteError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(to_err)?;
    file.write_all(bytes).map_err(to_err)
}
