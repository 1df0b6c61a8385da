//! Process execution abstraction for testability.
//!
//! The [`CommandRunner`] trait abstracts spawning external CLIs, allowing
//! production code to use [`ProcessRunner`] while tests use `MockRunner`.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────┐ ┌────────┐ ┌─────────┐
//!   │ Tofu │ │ Gcloud │ │ Kubectl │
//!   └──┬───┘ └───┬────┘ └────┬────┘
//!      └─────────┼───────────┘
//!                ▼
//!        ┌───────────────┐
//!        │ CommandRunner │ (trait)
//!        └───────────────┘
//!           │         │
//!           ▼         ▼
//!   ┌─────────────┐ ┌──────┐
//!   │ProcessRunner│ │ Mock │
//!   └──────┬──────┘ └──────┘
//!          ▼
//!    tokio::process
//! ```
//!
//! A non-zero exit status is not an error at this layer: [`CommandRunner::run`]
//! returns it in [`CommandOutput::exit_code`]. Use [`CommandRunner::run_checked`]
//! when a failing exit should become [`ExecError::Failed`].

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::debug;

use infraguard_core::metrics::{COMMANDS_TOTAL, LABEL_PROGRAM, LABEL_RESULT};

use crate::error::ExecError;

/// A fully described invocation of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed verbatim (no shell).
    pub args: Vec<String>,
    /// Working directory; inherits the current one when `None`.
    pub dir: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Renders the command line for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait abstracting process execution.
///
/// The trait is `Send + Sync + 'static`, allowing runners to be shared
/// through `Arc` across spawned cleanup tasks.
///
/// # Implementations
///
/// - [`ProcessRunner`]: spawns real processes via `tokio::process`
/// - `MockRunner`: scripted responses (tests, or the `testing` feature)
pub trait CommandRunner: Send + Sync + 'static {
    /// Runs the command to completion and captures its output.
    ///
    /// # Errors
    ///
    /// - `ExecError::Spawn`: the program could not be started
    /// - `ExecError::TimedOut`: `spec.timeout` elapsed; the process was killed
    fn run(&self, spec: &CommandSpec)
    -> impl Future<Output = Result<CommandOutput, ExecError>> + Send;

    /// Like [`run`](Self::run), but a non-zero exit becomes `ExecError::Failed`.
    fn run_checked(
        &self,
        spec: &CommandSpec,
    ) -> impl Future<Output = Result<CommandOutput, ExecError>> + Send {
        async move {
            let output = self.run(spec).await?;
            if output.success() {
                Ok(output)
            } else {
                Err(ExecError::Failed {
                    command: spec.display(),
                    code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
        }
    }
}

/// Production runner backed by `tokio::process`.
///
/// stdin is closed so that an unexpected interactive prompt fails fast
/// instead of hanging the test.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        debug!(
            command = %spec.display(),
            dir = ?spec.dir,
            "running command"
        );

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let result = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    // kill_on_drop 때문에 output future가 drop되면서 프로세스도 종료됨
                    record(&spec.program, "timeout");
                    return Err(ExecError::TimedOut {
                        command: spec.display(),
                        timeout: limit,
                    });
                }
            },
            None => cmd.output().await,
        };

        let output = result.map_err(|e| {
            record(&spec.program, "spawn_error");
            ExecError::Spawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            }
        })?;

        let output = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        };

        record(
            &spec.program,
            if output.success() { "success" } else { "failure" },
        );
        debug!(
            command = %spec.display(),
            exit_code = output.exit_code,
            duration_ms = u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX),
            "command finished"
        );

        Ok(output)
    }
}

fn record(program: &str, result: &'static str) {
    counter!(
        COMMANDS_TOTAL,
        LABEL_PROGRAM => program_label(program),
        LABEL_RESULT => result
    )
    .increment(1);
}

/// Uses the binary's file name so a full path does not explode label cardinality.
fn program_label(program: &str) -> String {
    std::path::Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_owned())
}
