//! gcloud wrapper bound to a single project.
//!
//! Every invocation is prefixed with `--project <id>` so a test can never
//! touch the operator's default project by accident.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::ExecError;
use crate::runner::{CommandRunner, CommandSpec};

pub struct Gcloud<R: CommandRunner> {
    runner: Arc<R>,
    binary: String,
    project: String,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

// derive(Clone)는 R: Clone을 요구하므로 직접 구현
impl<R: CommandRunner> Clone for Gcloud<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            binary: self.binary.clone(),
            project: self.project.clone(),
            env: self.env.clone(),
            timeout: self.timeout,
        }
    }
}

impl<R: CommandRunner> Gcloud<R> {
    pub fn new(runner: Arc<R>, project: impl Into<String>) -> Self {
        Self {
            runner,
            binary: "gcloud".to_owned(),
            project: project.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a copy that sets `key=value` in the environment of every call.
    pub fn with_env(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.env.insert(key.into(), value.into());
        copy
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn spec(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .args(["--project", self.project.as_str()])
            .args(args.iter().copied())
            .envs(&self.env)
            .timeout(self.timeout)
    }

    /// Runs the command and returns trimmed stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, ExecError> {
        let output = self.runner.run_checked(&self.spec(args)).await?;
        Ok(output.stdout.trim().to_owned())
    }

    /// Runs the command and discards stdout.
    pub async fn run_quiet(&self, args: &[&str]) -> Result<(), ExecError> {
        self.runner.run_checked(&self.spec(args)).await.map(|_| ())
    }

    /// Returns whether the command exits with status 0.
    ///
    /// Used for existence probes (`describe`), where any failure, including
    /// a spawn error, means "absent".
    pub async fn succeeds(&self, args: &[&str]) -> bool {
        let spec = self.spec(args);
        match self.runner.run(&spec).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!(command = %spec.display(), error = %e, "probe could not run");
                false
            }
        }
    }
}

/// Parses a boolean printed by `gcloud --format=value(...)`.
///
/// gcloud prints an empty string for an unset (false) boolean field.
pub fn parse_gcloud_bool(out: &str) -> Result<bool, ExecError> {
    match out.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" | "" => Ok(false),
        other => Err(ExecError::Output {
            program: "gcloud".to_owned(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
