//! OpenTofu module handle.
//!
//! [`Tofu`] wraps one working directory (usually a staged copy of a module)
//! together with the input variables, environment and retry policy used for
//! every invocation against it.
//!
//! # Argument layout
//!
//! | subcommand | arguments |
//! |------------|-----------|
//! | `init` | `init -input=false -no-color` |
//! | `apply`, `destroy`, `plan`, `import`, `refresh` | `<sub> -input=false -no-color -var-file=<file> ...` |
//! | `state` | `state <op> ...` (no flags, no var file) |
//! | `output` | `output -no-color ...` |
//!
//! Variables are written to [`VAR_FILE_NAME`] inside the module directory
//! before each command that reads them, so values set through
//! [`Tofu::set_var`] after a cleanup was registered are still seen by the
//! eventual `destroy`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{info, warn};

use infraguard_core::config::TofuConfig;
use infraguard_core::metrics::COMMAND_RETRIES_TOTAL;

use crate::error::ExecError;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// File name of the generated variable file.
pub const VAR_FILE_NAME: &str = "infraguard.auto.tfvars.json";

/// Which tofu errors are worth another attempt, and how long to wait.
///
/// Only failures whose output matches one of `patterns` are retried; every
/// other failure is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
    patterns: Vec<Regex>,
}

impl RetryPolicy {
    /// Compiles the given patterns.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::RetryPattern` for the first pattern that fails to compile.
    pub fn new(
        max_retries: u32,
        backoff: Duration,
        patterns: &[String],
    ) -> Result<Self, ExecError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ExecError::RetryPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            max_retries,
            backoff,
            patterns,
        })
    }

    /// Never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
            patterns: Vec::new(),
        }
    }

    pub fn from_config(config: &TofuConfig) -> Result<Self, ExecError> {
        Self::new(
            config.max_retries,
            config.retry_backoff(),
            &config.retryable_errors,
        )
    }

    /// Returns the first pattern matching the failure output, if any.
    fn matching(&self, err: &ExecError) -> Option<&str> {
        let text = err.output_text();
        self.patterns
            .iter()
            .find(|re| re.is_match(&text))
            .map(Regex::as_str)
    }
}

/// Handle to one OpenTofu working directory.
pub struct Tofu<R: CommandRunner> {
    runner: Arc<R>,
    binary: String,
    dir: PathBuf,
    vars: Mutex<Map<String, Value>>,
    env: BTreeMap<String, String>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl<R: CommandRunner> Tofu<R> {
    /// Creates a handle using the `tofu` binary and no retries.
    pub fn new(runner: Arc<R>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: "tofu".to_owned(),
            dir: dir.into(),
            vars: Mutex::new(Map::new()),
            env: BTreeMap::new(),
            retry: RetryPolicy::none(),
            timeout: None,
        }
    }

    /// Creates a handle with binary, retry policy and timeout taken from `[tofu]`.
    pub fn from_config(
        runner: Arc<R>,
        dir: impl Into<PathBuf>,
        config: &TofuConfig,
    ) -> Result<Self, ExecError> {
        Ok(Self::new(runner, dir)
            .with_binary(&config.binary)
            .with_retry(RetryPolicy::from_config(config)?)
            .with_timeout(config.command_timeout()))
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_var(self, key: impl Into<String>, value: Value) -> Self {
        self.set_var(key, value);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets (or replaces) an input variable.
    pub fn set_var(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut vars) = self.vars.lock() {
            vars.insert(key.into(), value);
        }
    }

    /// Current value of an input variable.
    pub fn var(&self, key: &str) -> Option<Value> {
        self.vars.lock().ok().and_then(|v| v.get(key).cloned())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn var_file_path(&self) -> PathBuf {
        self.dir.join(VAR_FILE_NAME)
    }

    /// Writes the current variables as pretty JSON (mode 0600 on unix).
    pub async fn write_var_file(&self) -> Result<PathBuf, ExecError> {
        let snapshot = self.vars.lock().map(|v| v.clone()).unwrap_or_default();
        let data = serde_json::to_vec_pretty(&Value::Object(snapshot))?;
        let path = self.var_file_path();
        tokio::fs::write(&path, data).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(path)
    }

    pub async fn init(&self) -> Result<String, ExecError> {
        self.run("init", &[]).await
    }

    pub async fn apply(&self) -> Result<String, ExecError> {
        self.run("apply", &["-auto-approve"]).await
    }

    pub async fn init_and_apply(&self) -> Result<String, ExecError> {
        self.init().await?;
        self.apply().await
    }

    /// Runs `plan` and returns its stdout.
    pub async fn plan(&self) -> Result<String, ExecError> {
        self.run("plan", &["-lock=false"]).await
    }

    pub async fn init_and_plan(&self) -> Result<String, ExecError> {
        self.init().await?;
        self.plan().await
    }

    pub async fn destroy(&self) -> Result<String, ExecError> {
        self.run("destroy", &["-auto-approve"]).await
    }

    /// Destroys only the given resource addresses.
    pub async fn destroy_targets(&self, targets: &[String]) -> Result<String, ExecError> {
        let mut rest = vec!["-auto-approve".to_owned()];
        rest.extend(targets.iter().map(|t| format!("-target={t}")));
        self.run_owned("destroy", rest).await
    }

    /// Imports an existing remote object into state under `address`.
    pub async fn import(&self, address: &str, id: &str) -> Result<String, ExecError> {
        self.run("import", &[address, id]).await
    }

    /// Removes `address` from state without touching the remote object.
    pub async fn state_rm(&self, address: &str) -> Result<String, ExecError> {
        self.run("state", &["rm", address]).await
    }

    /// Reads an output value as a string.
    ///
    /// String outputs are returned verbatim; any other JSON value is
    /// returned in its compact JSON form.
    pub async fn output(&self, name: &str) -> Result<String, ExecError> {
        let value: Value = self.output_json(name).await?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Reads and decodes an output value.
    pub async fn output_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, ExecError> {
        let raw = self.run("output", &["-json", name]).await?;
        serde_json::from_str(raw.trim()).map_err(|e| ExecError::Output {
            program: self.binary.clone(),
            reason: format!("output '{name}' is not valid JSON: {e}"),
        })
    }

    /// Reads a `map(string)` output.
    pub async fn output_map(&self, name: &str) -> Result<BTreeMap<String, String>, ExecError> {
        self.output_json(name).await
    }

    async fn run(&self, sub: &str, rest: &[&str]) -> Result<String, ExecError> {
        self.run_owned(sub, rest.iter().map(|s| (*s).to_owned()).collect())
            .await
    }

    async fn run_owned(&self, sub: &str, rest: Vec<String>) -> Result<String, ExecError> {
        let var_file = if takes_var_file(sub) {
            Some(self.write_var_file().await?)
        } else {
            None
        };
        let args = build_args(sub, var_file.as_deref(), rest);
        let spec = CommandSpec::new(&self.binary)
            .args(args)
            .current_dir(&self.dir)
            .envs(&self.env)
            .timeout(self.timeout);

        let output = self.execute_with_retry(&spec).await?;
        Ok(output.stdout)
    }

    /// 일시적 에러 패턴에 일치하는 실패만 재시도합니다.
    async fn execute_with_retry(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let backoff = self.retry.backoff * attempt;
                warn!(
                    dir = %self.dir.display(),
                    command = %spec.display(),
                    attempt = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying tofu command"
                );
                counter!(COMMAND_RETRIES_TOTAL).increment(1);
                tokio::time::sleep(backoff).await;
            }

            match self.runner.run_checked(spec).await {
                Ok(output) => return Ok(output),
                Err(e) => match self.retry.matching(&e) {
                    Some(pattern) => {
                        info!(
                            dir = %self.dir.display(),
                            pattern = pattern,
                            "tofu failed with a known transient error"
                        );
                        last_error = Some(e);
                    }
                    None => return Err(e),
                },
            }
        }

        Err(last_error.unwrap_or_else(|| ExecError::Output {
            program: self.binary.clone(),
            reason: "retries exhausted without an error".to_owned(),
        }))
    }
}

fn takes_var_file(sub: &str) -> bool {
    matches!(sub, "apply" | "destroy" | "plan" | "import" | "refresh")
}

/// Builds the full argument vector for a tofu subcommand.
pub fn build_args(sub: &str, var_file: Option<&Path>, rest: Vec<String>) -> Vec<String> {
    let mut args = vec![sub.to_owned()];
    match sub {
        "state" => {}
        "output" => args.push("-no-color".to_owned()),
        _ => {
            args.push("-input=false".to_owned());
            args.push("-no-color".to_owned());
            if let Some(path) = var_file {
                args.push(format!("-var-file={}", path.display()));
            }
        }
    }
    args.extend(rest);
    args
}
