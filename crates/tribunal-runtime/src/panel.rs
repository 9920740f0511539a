//! Judge panel: one judge per domain, run concurrently.
//!
//! # Architecture
//! - Fan-out: every domain gets its own worker in a [`JoinSet`]
//! - Isolation: a worker that fails, times out or panics records a `Failed`
//!   judgment for its domain and nothing else
//! - Global deadline: unfinished workers are aborted and recorded as
//!   cancelled; finished results are kept
//! - Fan-in: results are returned in domain order, one per domain

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use futures::FutureExt;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use tribunal_core::{Domain, JudgeFailure, JudgmentResult, ScoringParser};

use crate::invoker::{AgentInvoker, Invocation, InvocationError};
use crate::prompts::build_judge_prompt;
use crate::rubric::RubricSource;

/// Errors from a panel evaluation.
#[derive(Error, Debug)]
pub enum PanelError {
    /// Every judge failed. The collected (all `Failed`) results are kept for
    /// auditing.
    #[error("All {} judges failed", results.len())]
    AllJudgesFailed { results: Vec<JudgmentResult> },

    #[error("No domains to judge")]
    NoDomains,
}

/// Retry policy for transient judge failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first; 0 disables retrying
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }
}

/// Runs one judge per domain against a single agent output.
pub struct JudgePanel {
    invoker: Arc<dyn AgentInvoker>,
    rubrics: Arc<dyn RubricSource>,
    retry: RetryPolicy,
}

impl JudgePanel {
    /// Create a panel that reaches every judge through `invoker`.
    pub fn new(invoker: Arc<dyn AgentInvoker>, rubrics: Arc<dyn RubricSource>) -> Self {
        Self {
            invoker,
            rubrics,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Judge `agent_output` in every domain concurrently.
    ///
    /// Returns one result per distinct domain, in domain order. Judges that
    /// fail, exceed `per_judge_timeout`, or are still running when
    /// `global_timeout` elapses are recorded as `Failed`.
    ///
    /// # Errors
    ///
    /// `AllJudgesFailed` when no judge produced a usable score.
    pub async fn evaluate(
        &self,
        agent_output: &str,
        domains: &[Domain],
        per_judge_timeout: Duration,
        global_timeout: Duration,
    ) -> Result<Vec<JudgmentResult>, PanelError> {
        let mut domains = domains.to_vec();
        domains.sort();
        domains.dedup();
        if domains.is_empty() {
            return Err(PanelError::NoDomains);
        }

        // A timeout too large to represent as an instant means no deadline.
        let deadline = tokio::time::Instant::now().checked_add(global_timeout);
        let agent_output: Arc<str> = Arc::from(agent_output);

        let mut workers = JoinSet::new();
        let mut task_domains = HashMap::new();
        for &domain in &domains {
            let worker = JudgeWorker {
                invoker: Arc::clone(&self.invoker),
                rubrics: Arc::clone(&self.rubrics),
                retry: self.retry,
                timeout: per_judge_timeout,
            };
            let output = Arc::clone(&agent_output);
            let span = tracing::info_span!("judge", domain = %domain);

            let handle = workers.spawn(async move {
                match AssertUnwindSafe(worker.judge(domain, &output))
                    .catch_unwind()
                    .await
                {
                    Ok(judgment) => judgment,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::warn!(domain = %domain, panic = %message, "Judge worker panicked");
                        JudgmentResult::failed(domain, "", JudgeFailure::WorkerCrashed(message))
                    }
                }
            }
            .instrument(span));
            task_domains.insert(handle.id(), domain);
        }

        let mut collected: BTreeMap<Domain, JudgmentResult> = BTreeMap::new();
        loop {
            let next = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, workers.join_next()).await,
                None => Ok(workers.join_next().await),
            };
            match next {
                Ok(Some(Ok(judgment))) => {
                    collected.insert(judgment.domain, judgment);
                }
                Ok(Some(Err(e))) => {
                    if let Some(&domain) = task_domains.get(&e.id()) {
                        collected.insert(domain, crashed_judgment(domain, &e));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        timeout = ?global_timeout,
                        pending = workers.len(),
                        "Global judging deadline elapsed, cancelling unfinished judges"
                    );
                    workers.abort_all();
                    break;
                }
            }
        }

        let results: Vec<JudgmentResult> = domains
            .iter()
            .map(|domain| {
                collected.remove(domain).unwrap_or_else(|| {
                    tracing::warn!(domain = %domain, "Judge did not finish before the deadline");
                    JudgmentResult::failed(*domain, "", JudgeFailure::Cancelled)
                })
            })
            .collect();

        if results.iter().all(|j| j.parse_status.is_failed()) {
            return Err(PanelError::AllJudgesFailed { results });
        }

        Ok(results)
    }
}

/// Everything one worker needs, owned so it can move into the task.
struct JudgeWorker {
    invoker: Arc<dyn AgentInvoker>,
    rubrics: Arc<dyn RubricSource>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl JudgeWorker {
    async fn judge(&self, domain: Domain, agent_output: &str) -> JudgmentResult {
        let rubric = match self.rubrics.load(domain) {
            Ok(rubric) => rubric,
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Rubric unavailable");
                return JudgmentResult::failed(
                    domain,
                    "",
                    JudgeFailure::RubricUnavailable(e.to_string()),
                );
            }
        };

        let prompt = build_judge_prompt(&rubric, agent_output);

        match self.invoke_with_retry(domain, &prompt).await {
            Ok(invocation) => {
                let judgment = ScoringParser::new().parse(domain, &invocation.text);
                tracing::debug!(
                    domain = %domain,
                    score = judgment.domain_score,
                    status = ?judgment.parse_status,
                    duration_ms = invocation.duration_ms,
                    "Judge finished"
                );
                judgment
            }
            Err(InvocationError::Timeout(after)) => {
                tracing::warn!(domain = %domain, timeout = ?after, "Judge timed out");
                JudgmentResult::failed(
                    domain,
                    "",
                    JudgeFailure::Timeout(format!("no response within {after:?}")),
                )
            }
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Judge invocation failed");
                JudgmentResult::failed(domain, "", JudgeFailure::Invocation(e.to_string()))
            }
        }
    }

    async fn invoke_with_retry(
        &self,
        domain: Domain,
        prompt: &str,
    ) -> Result<Invocation, InvocationError> {
        if self.retry.max_retries == 0 {
            return self.invoke_once(prompt).await;
        }

        (|| self.invoke_once(prompt))
            .retry(self.retry.backoff())
            .when(InvocationError::is_transient)
            .notify(|e: &InvocationError, delay: Duration| {
                tracing::warn!(domain = %domain, error = %e, delay = ?delay, "Retrying judge");
            })
            .await
    }

    async fn invoke_once(&self, prompt: &str) -> Result<Invocation, InvocationError> {
        // Enforced here as well so an invoker that ignores its timeout cannot
        // hold the worker past it.
        tokio::time::timeout(self.timeout, self.invoker.invoke(prompt, self.timeout))
            .await
            .map_err(|_| InvocationError::Timeout(self.timeout))?
    }
}

fn crashed_judgment(domain: Domain, error: &JoinError) -> JudgmentResult {
    tracing::warn!(domain = %domain, error = %error, "Judge task ended without a result");
    JudgmentResult::failed(domain, "", JudgeFailure::WorkerCrashed(error.to_string()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::domain_header;
    use crate::rubric::BuiltinRubrics;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tribunal_core::ParseStatus;

    #[derive(Clone)]
    enum Script {
        Reply(String),
        Slow(Duration, String),
        Fail,
        Panic,
        /// Fail this many times, then reply
        Flaky(usize, String),
    }

    struct ScriptedJudges {
        scripts: HashMap<Domain, Script>,
        attempts: Mutex<HashMap<Domain, usize>>,
    }

    impl ScriptedJudges {
        fn new(scripts: impl IntoIterator<Item = (Domain, Script)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts.into_iter().collect(),
                attempts: Mutex::new(HashMap::new()),
            })
        }

        fn attempts(&self, domain: Domain) -> usize {
            self.attempts.lock().get(&domain).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedJudges {
        async fn invoke(
            &self,
            prompt: &str,
            _timeout: Duration,
        ) -> Result<Invocation, InvocationError> {
            let domain = Domain::ALL
                .into_iter()
                .find(|d| prompt.contains(&domain_header(*d)))
                .expect("prompt names a domain");
            let attempt = {
                let mut attempts = self.attempts.lock();
                let n = attempts.entry(domain).or_insert(0);
                *n += 1;
                *n
            };

            let reply = match self.scripts[&domain].clone() {
                Script::Reply(text) => text,
                Script::Slow(delay, text) => {
                    tokio::time::sleep(delay).await;
                    text
                }
                Script::Fail => {
                    return Err(InvocationError::NonZeroExit {
                        code: Some(1),
                        diagnostics: "judge crashed".into(),
                    })
                }
                Script::Panic => panic!("judge exploded"),
                Script::Flaky(failures, text) => {
                    if attempt <= failures {
                        return Err(InvocationError::NonZeroExit {
                            code: Some(503),
                            diagnostics: "overloaded".into(),
                        });
                    }
                    text
                }
            };
            Invocation::from_output(reply, String::new(), Duration::ZERO)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn all_scores(domain: Domain, score: u32) -> String {
        domain
            .criteria()
            .iter()
            .map(|c| format!("SCORE {}: {}/10\n", c.id, score))
            .collect()
    }

    fn panel(judges: Arc<ScriptedJudges>) -> JudgePanel {
        JudgePanel::new(judges, Arc::new(BuiltinRubrics))
    }

    const JUDGE_TIMEOUT: Duration = Duration::from_secs(120);
    const GLOBAL_TIMEOUT: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_all_judges_succeed() {
        let judges = ScriptedJudges::new(
            Domain::ALL.map(|d| (d, Script::Reply(all_scores(d, 9)))),
        );

        let results = panel(judges)
            .evaluate("output", &Domain::ALL, JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        let domains: Vec<Domain> = results.iter().map(|j| j.domain).collect();
        assert_eq!(domains, Domain::ALL.to_vec());
        assert!(results.iter().all(|j| j.domain_score == 45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_judge_is_isolated() {
        let judges = ScriptedJudges::new([
            (Domain::Correctness, Script::Reply(all_scores(Domain::Correctness, 8))),
            (Domain::Security, Script::Fail),
            (Domain::Maintainability, Script::Reply(all_scores(Domain::Maintainability, 7))),
            (Domain::Testing, Script::Reply(all_scores(Domain::Testing, 6))),
        ]);

        let results = panel(judges)
            .evaluate("output", &Domain::ALL, JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap();

        let security = &results[1];
        assert_eq!(security.domain, Domain::Security);
        assert_eq!(security.parse_status, ParseStatus::Failed);
        assert_eq!(security.domain_score, 0);
        assert!(matches!(security.failure, Some(JudgeFailure::Invocation(_))));
        assert_eq!(results[0].domain_score, 40);
        assert_eq!(results[3].domain_score, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_judge_hits_per_judge_timeout() {
        let judges = ScriptedJudges::new([
            (Domain::Correctness, Script::Reply(all_scores(Domain::Correctness, 9))),
            (Domain::Security, Script::Reply(all_scores(Domain::Security, 9))),
            (Domain::Maintainability, Script::Reply(all_scores(Domain::Maintainability, 9))),
            (
                Domain::Testing,
                Script::Slow(Duration::from_secs(600), all_scores(Domain::Testing, 9)),
            ),
        ]);

        let results = panel(judges)
            .evaluate("output", &Domain::ALL, JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap();

        assert!(matches!(results[3].failure, Some(JudgeFailure::Timeout(_))));
        let total: u32 = results.iter().map(|j| j.domain_score).sum();
        assert_eq!(total, 135);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_deadline_cancels_unfinished() {
        let judges = ScriptedJudges::new([
            (Domain::Correctness, Script::Reply(all_scores(Domain::Correctness, 9))),
            (
                Domain::Security,
                Script::Slow(Duration::from_secs(200), all_scores(Domain::Security, 9)),
            ),
        ]);

        let results = panel(judges)
            .evaluate(
                "output",
                &[Domain::Security, Domain::Correctness],
                Duration::from_secs(300),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(results[0].domain_score, 45);
        assert_eq!(results[1].failure, Some(JudgeFailure::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_worker_is_recorded() {
        let judges = ScriptedJudges::new([
            (Domain::Correctness, Script::Panic),
            (Domain::Testing, Script::Reply(all_scores(Domain::Testing, 5))),
        ]);

        let results = panel(judges)
            .evaluate(
                "output",
                &[Domain::Correctness, Domain::Testing],
                JUDGE_TIMEOUT,
                GLOBAL_TIMEOUT,
            )
            .await
            .unwrap();

        assert_eq!(
            results[0].failure,
            Some(JudgeFailure::WorkerCrashed("judge exploded".into()))
        );
        assert_eq!(results[1].domain_score, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_carries_results() {
        let judges = ScriptedJudges::new(Domain::ALL.map(|d| (d, Script::Fail)));

        let err = panel(judges)
            .evaluate("output", &Domain::ALL, JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap_err();

        match err {
            PanelError::AllJudgesFailed { results } => {
                assert_eq!(results.len(), 4);
                assert!(results.iter().all(|j| j.parse_status.is_failed()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_responses_count_as_failed() {
        let judges = ScriptedJudges::new(
            Domain::ALL.map(|d| (d, Script::Reply("Looks great, roughly 8 out of 10.".into()))),
        );

        let err = panel(judges)
            .evaluate("output", &Domain::ALL, JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, PanelError::AllJudgesFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let judges = ScriptedJudges::new([(
            Domain::Security,
            Script::Flaky(2, all_scores(Domain::Security, 8)),
        )]);

        let results = panel(judges.clone())
            .with_retry(RetryPolicy::default().with_max_retries(2))
            .evaluate("output", &[Domain::Security], JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(results[0].domain_score, 40);
        assert_eq!(judges.attempts(Domain::Security), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_by_default() {
        let judges = ScriptedJudges::new([
            (Domain::Security, Script::Flaky(1, all_scores(Domain::Security, 8))),
            (Domain::Testing, Script::Reply(all_scores(Domain::Testing, 8))),
        ]);

        let results = panel(judges.clone())
            .evaluate(
                "output",
                &[Domain::Security, Domain::Testing],
                JUDGE_TIMEOUT,
                GLOBAL_TIMEOUT,
            )
            .await
            .unwrap();

        assert!(results[0].parse_status.is_failed());
        assert_eq!(judges.attempts(Domain::Security), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeouts() {
        let judges = ScriptedJudges::new([(
            Domain::Security,
            Script::Slow(Duration::from_secs(3600), all_scores(Domain::Security, 7)),
        )]);

        let results = panel(judges)
            .evaluate("output", &[Domain::Security], Duration::MAX, Duration::MAX)
            .await
            .unwrap();

        assert_eq!(results[0].domain_score, 35);
    }

    #[tokio::test]
    async fn test_join_error_is_recorded_as_crash() {
        let err = tokio::spawn(async { panic!("escaped") }).await.unwrap_err();

        let judgment = crashed_judgment(Domain::Maintainability, &err);

        assert_eq!(judgment.domain, Domain::Maintainability);
        assert!(judgment.parse_status.is_failed());
        assert!(matches!(judgment.failure, Some(JudgeFailure::WorkerCrashed(_))));
    }

    #[tokio::test]
    async fn test_empty_domain_list() {
        let judges = ScriptedJudges::new(Vec::<(Domain, Script)>::new());
        let err = panel(judges)
            .evaluate("output", &[], JUDGE_TIMEOUT, GLOBAL_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::NoDomains));
    }
}
