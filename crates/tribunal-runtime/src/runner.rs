//! Scenario runner: one scenario, end to end.
//!
//! # Execution Flow
//! 1. Invoke the agent-under-test with the scenario prompt
//! 2. Fan the output out to the judge panel
//! 3. Aggregate the judgments into a verdict (deterministic)
//! 4. Persist every artifact
//! 5. Assert the verdict matches the scenario's expectation, then run checks

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::Instrument;

use tribunal_core::{
    AggregateError, AggregateResult, JudgmentResult, RunId, ScenarioDefinition, ScenarioSuite,
    ScoreAggregator,
};

use crate::artifacts::{ArtifactLogger, ArtifactWriteError};
use crate::checks::{CheckSet, ScenarioCheck};
use crate::config::{ConfigError, HarnessConfig};
use crate::invoker::AgentInvoker;
use crate::panel::{JudgePanel, PanelError};
use crate::rubric::RubricSource;
use crate::HarnessError;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    AgentInvoked,
    Judging,
    Aggregated,
    Persisted,
    Asserted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Created => "created",
            RunState::AgentInvoked => "agent_invoked",
            RunState::Judging => "judging",
            RunState::Aggregated => "aggregated",
            RunState::Persisted => "persisted",
            RunState::Asserted => "asserted",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and logs each transition.
struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        tracing::debug!(state = %RunState::Created, "Run state");
        Self {
            state: RunState::Created,
        }
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
    }
}

/// Attempts at claiming a run directory before giving up.
const MAX_PERSIST_ATTEMPTS: usize = 3;

/// Run that made it to disk.
struct Recorded {
    run_id: RunId,
    aggregate: AggregateResult,
    all_failed: bool,
    artifact_dir: PathBuf,
}

/// Outcome of a run whose verdict matched and whose checks passed.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario: String,
    pub run_id: RunId,
    pub agent_output: String,
    pub judgments: Vec<JudgmentResult>,
    pub aggregate: AggregateResult,
    pub artifact_dir: PathBuf,
}

/// Drives scenarios through agent, panel, aggregator and artifact logger.
pub struct ScenarioRunner {
    config: HarnessConfig,
    agent: Arc<dyn AgentInvoker>,
    judge: Arc<dyn AgentInvoker>,
    rubrics: Arc<dyn RubricSource>,
    aggregator: ScoreAggregator,
    logger: Arc<ArtifactLogger>,
    checks: CheckSet,
}

impl ScenarioRunner {
    /// Create a runner from a validated configuration.
    ///
    /// `agent` runs the scenario prompt; `judge` runs every judge prompt.
    pub fn new(
        config: HarnessConfig,
        agent: Arc<dyn AgentInvoker>,
        judge: Arc<dyn AgentInvoker>,
    ) -> Result<Self, ConfigError> {
        let aggregator = config.aggregator()?;
        let rubrics = config.rubric_source();
        let logger = Arc::new(ArtifactLogger::new(config.artifact_root.clone()));

        Ok(Self {
            config,
            agent,
            judge,
            rubrics,
            aggregator,
            logger,
            checks: CheckSet::new(),
        })
    }

    pub fn with_rubrics(mut self, rubrics: Arc<dyn RubricSource>) -> Self {
        self.rubrics = rubrics;
        self
    }

    /// Share a logger, e.g. with another runner writing to the same root.
    pub fn with_logger(mut self, logger: Arc<ArtifactLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_checks(mut self, checks: CheckSet) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_check(mut self, check: impl ScenarioCheck + 'static) -> Self {
        self.checks.add(Box::new(check));
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<ArtifactLogger> {
        &self.logger
    }

    fn panel(&self) -> JudgePanel {
        JudgePanel::new(Arc::clone(&self.judge), Arc::clone(&self.rubrics))
            .with_retry(self.config.retry_policy())
    }

    /// Run one scenario.
    ///
    /// # Errors
    ///
    /// - `AgentInvocation` when the agent-under-test fails
    /// - `Artifact` when artifacts cannot be written
    /// - `AllJudgesFailed`, `VerdictMismatch` and `ChecksFailed` after
    ///   artifacts are written; all three carry the run directory
    pub async fn run(&self, scenario: &ScenarioDefinition) -> Result<ScenarioReport, HarnessError> {
        scenario.validate()?;
        let run_id = self.logger.next_run_id(&scenario.name);
        let span = tracing::info_span!(
            "scenario",
            scenario = %scenario.name,
            run_id = %run_id
        );
        self.run_inner(scenario, run_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        scenario: &ScenarioDefinition,
        run_id: RunId,
    ) -> Result<ScenarioReport, HarnessError> {
        let mut tracker = RunTracker::new();
        tracing::info!(agent = self.agent.name(), "Starting scenario");

        let invocation = self
            .agent
            .invoke(&scenario.prompt, self.config.agent_timeout)
            .await;
        tracker.advance(RunState::AgentInvoked);
        let invocation = invocation.map_err(|source| {
            tracing::warn!(error = %source, "Agent invocation failed");
            HarnessError::AgentInvocation {
                scenario: scenario.name.clone(),
                source,
            }
        })?;
        let agent_output = invocation.text;

        tracker.advance(RunState::Judging);
        let judgments = match self
            .panel()
            .evaluate(
                &agent_output,
                self.aggregator.domains(),
                self.config.judge_timeout,
                self.config.global_timeout,
            )
            .await
        {
            Ok(judgments) => judgments,
            Err(PanelError::AllJudgesFailed { results }) => results,
            Err(PanelError::NoDomains) => return Err(HarnessError::Config(ConfigError::NoDomains)),
        };

        let Recorded {
            run_id,
            aggregate,
            all_failed,
            artifact_dir,
        } = self.record(scenario, run_id, &agent_output, &judgments, &mut tracker)?;

        if all_failed {
            tracing::warn!(dir = %artifact_dir.display(), "Every judge failed");
            return Err(HarnessError::AllJudgesFailed {
                scenario: scenario.name.clone(),
                results: judgments,
                artifact_dir,
            });
        }

        tracing::info!(
            total = aggregate.total_score,
            max = aggregate.max_score,
            verdict = aggregate.verdict_label(),
            degraded = aggregate.degraded,
            "Scenario judged"
        );

        if aggregate.passed != scenario.expected_pass {
            tracing::warn!(
                expected_pass = scenario.expected_pass,
                dir = %artifact_dir.display(),
                "Verdict does not match expectation"
            );
            return Err(HarnessError::VerdictMismatch {
                scenario: scenario.name.clone(),
                expected_pass: scenario.expected_pass,
                actual_pass: aggregate.passed,
                total: aggregate.total_score,
                max: aggregate.max_score,
                artifact_dir,
            });
        }

        let failures = self.checks.run(&agent_output, &judgments);
        tracker.advance(RunState::Asserted);
        if !failures.is_empty() {
            for failure in &failures {
                tracing::warn!(check = %failure.check, message = %failure.message, "Check failed");
            }
            return Err(HarnessError::ChecksFailed {
                scenario: scenario.name.clone(),
                failures,
                artifact_dir,
            });
        }

        Ok(ScenarioReport {
            scenario: scenario.name.clone(),
            run_id,
            agent_output,
            judgments,
            aggregate,
            artifact_dir,
        })
    }

    /// Aggregate and persist one run.
    ///
    /// A run directory that already exists, e.g. one claimed by another
    /// process on the same root, gets a fresh run id and another attempt.
    fn record(
        &self,
        scenario: &ScenarioDefinition,
        mut run_id: RunId,
        agent_output: &str,
        judgments: &[JudgmentResult],
        tracker: &mut RunTracker,
    ) -> Result<Recorded, HarnessError> {
        let mut attempt = 1;
        loop {
            let (aggregate, all_failed) = match self.aggregator.aggregate(&run_id, judgments) {
                Ok(aggregate) => (aggregate, false),
                Err(AggregateError::AllJudgesFailed { .. }) => {
                    (self.aggregator.failed_result(&run_id), true)
                }
                Err(other) => return Err(HarnessError::Aggregate(other)),
            };
            if attempt == 1 {
                tracker.advance(RunState::Aggregated);
            }

            match self
                .logger
                .persist(&run_id, &scenario.name, agent_output, judgments, &aggregate)
            {
                Ok(artifact_dir) => {
                    tracker.advance(RunState::Persisted);
                    return Ok(Recorded {
                        run_id,
                        aggregate,
                        all_failed,
                        artifact_dir,
                    });
                }
                Err(ArtifactWriteError::RunExists(dir)) if attempt < MAX_PERSIST_ATTEMPTS => {
                    run_id = self.logger.next_run_id(&scenario.name);
                    tracing::warn!(
                        taken = %dir.display(),
                        run_id = %run_id,
                        "Run directory already exists, retrying with a new run id"
                    );
                    tracing::Span::current().record("run_id", tracing::field::display(&run_id));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run scenarios concurrently; results are in input order.
    pub async fn run_all(
        &self,
        scenarios: &[ScenarioDefinition],
    ) -> Vec<Result<ScenarioReport, HarnessError>> {
        join_all(scenarios.iter().map(|s| self.run(s))).await
    }

    /// Run every scenario of a suite.
    pub async fn run_suite(
        &self,
        suite: &ScenarioSuite,
    ) -> Vec<Result<ScenarioReport, HarnessError>> {
        self.run_all(&suite.scenarios).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::CommandInvoker;
    use chrono::{TimeZone, Utc};
    use tribunal_core::{Domain, JudgeFailure, ScoringParser};

    fn idle_runner(root: &std::path::Path) -> ScenarioRunner {
        let invoker = Arc::new(CommandInvoker::new("true"));
        let config = HarnessConfig::default().with_artifact_root(root);
        ScenarioRunner::new(config, invoker.clone(), invoker).unwrap()
    }

    fn scored(score: u32) -> Vec<JudgmentResult> {
        Domain::ALL
            .iter()
            .map(|d| {
                let text: String = d
                    .criteria()
                    .iter()
                    .map(|c| format!("SCORE {}: {}/10\n", c.id, score))
                    .collect();
                ScoringParser::new().parse(*d, &text)
            })
            .collect()
    }

    #[test]
    fn test_taken_run_directory_gets_a_new_id() {
        let root = tempfile::tempdir().unwrap();
        let runner = idle_runner(root.path());
        let scenario = ScenarioDefinition::new("collide", "Do it", true);

        let taken = RunId::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(), "collide");
        std::fs::create_dir_all(runner.logger().run_dir(&taken)).unwrap();

        let recorded = runner
            .record(&scenario, taken.clone(), "output", &scored(9), &mut RunTracker::new())
            .unwrap();

        assert_ne!(recorded.run_id, taken);
        assert_eq!(recorded.aggregate.run_id, recorded.run_id);
        assert_eq!(recorded.artifact_dir, runner.logger().run_dir(&recorded.run_id));
        assert!(recorded.artifact_dir.join("run.json").exists());
        assert_eq!(runner.logger().history().unwrap().len(), 1);
    }

    #[test]
    fn test_all_failed_run_is_recorded_with_zero_score() {
        let root = tempfile::tempdir().unwrap();
        let runner = idle_runner(root.path());
        let scenario = ScenarioDefinition::new("silent judges", "Do it", true);
        let judgments: Vec<JudgmentResult> = Domain::ALL
            .iter()
            .map(|d| JudgmentResult::failed(*d, "", JudgeFailure::Cancelled))
            .collect();

        let run_id = runner.logger().next_run_id(&scenario.name);
        let recorded = runner
            .record(&scenario, run_id, "output", &judgments, &mut RunTracker::new())
            .unwrap();

        assert!(recorded.all_failed);
        assert_eq!(recorded.aggregate.total_score, 0);
        assert!(recorded.artifact_dir.join("summary.md").exists());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(RunState::AgentInvoked.to_string(), "agent_invoked");
        assert_eq!(RunState::Asserted.to_string(), "asserted");
    }

    #[test]
    fn test_tracker_advances() {
        let mut tracker = RunTracker::new();
        tracker.advance(RunState::AgentInvoked);
        tracker.advance(RunState::Judging);
        assert_eq!(tracker.state, RunState::Judging);
    }
}
