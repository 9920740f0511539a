//! Subprocess invoker.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{AgentInvoker, Invocation, InvocationError};

/// How the prompt reaches the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDelivery {
    /// Written to stdin, which is then closed
    #[default]
    Stdin,

    /// Appended as the last command-line argument
    Argument,
}

/// Runs a command per invocation, capturing stdout and stderr separately.
///
/// stdout is the invocation text; stderr only ever lands in
/// `Invocation::diagnostics` or in the failure message. The child is killed
/// when the timeout fires or the calling task is cancelled.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
    delivery: PromptDelivery,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandInvoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            delivery: PromptDelivery::default(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn delivery(mut self, delivery: PromptDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.delivery {
            PromptDelivery::Stdin => {
                cmd.stdin(Stdio::piped());
            }
            PromptDelivery::Argument => {
                cmd.arg(prompt).stdin(Stdio::null());
            }
        }

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl AgentInvoker for CommandInvoker {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<Invocation, InvocationError> {
        let start = Instant::now();

        let mut child = self
            .command(prompt)
            .spawn()
            .map_err(|e| InvocationError::NonZeroExit {
                code: None,
                diagnostics: format!("failed to spawn '{}': {}", self.program, e),
            })?;

        // Stdin is fed alongside output collection so a child that writes
        // before reading cannot deadlock on a full pipe. Dropping the handle
        // closes stdin.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    tracing::debug!(error = %e, "Child closed stdin before prompt was written");
                }
            }
        };
        let run = async {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| {
                tracing::warn!(program = %self.program, timeout = ?timeout, "Invocation timed out");
                InvocationError::Timeout(timeout)
            })?
            .map_err(|e| InvocationError::NonZeroExit {
                code: None,
                diagnostics: format!("failed to collect output of '{}': {}", self.program, e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(InvocationError::NonZeroExit {
                code: output.status.code(),
                diagnostics: stderr,
            });
        }

        Invocation::from_output(stdout, stderr, start.elapsed())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
