//! kubectl wrapper bound to a kubeconfig file and namespace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ExecError;
use crate::runner::{CommandRunner, CommandSpec};

pub struct Kubectl<R: CommandRunner> {
    runner: Arc<R>,
    binary: String,
    kubeconfig: PathBuf,
    namespace: Option<String>,
}

impl<R: CommandRunner> Kubectl<R> {
    pub fn new(runner: Arc<R>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: "kubectl".to_owned(),
            kubeconfig: kubeconfig.into(),
            namespace: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    fn spec(&self, args: &[&str]) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary)
            .arg("--kubeconfig")
            .arg(self.kubeconfig.display().to_string());
        if let Some(ns) = &self.namespace {
            spec = spec.args(["--namespace", ns.as_str()]);
        }
        spec.args(args.iter().copied())
    }

    /// Runs the command and returns trimmed stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, ExecError> {
        let output = self.runner.run_checked(&self.spec(args)).await?;
        Ok(output.stdout.trim().to_owned())
    }
}
