//! Cleanup registry -- LIFO 순서의 지연 teardown 액션 스택
//!
//! 리소스를 만들기 전에 해당 리소스의 teardown을 등록해 두면, 테스트가
//! 성공하든 실패하든 panic이 나든 [`CleanupRegistry::run_all`]이 등록의 역순으로
//! 모든 액션을 한 번씩 실행합니다.
//!
//! 각 액션은 별도 task에서 실행되므로 한 액션의 panic이 나머지 액션을 막지 않습니다.
//! cleanup 실패는 로그와 [`CleanupReport`]에만 남고 테스트 결과를 바꾸지 않습니다.

use std::any::Any;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tracing::{error, info, warn};

use infraguard_core::metrics::{CLEANUP_ACTIONS_TOTAL, LABEL_RESULT};
use infraguard_core::{CleanupReport, CleanupStatus, CleanupStep};
use infraguard_exec::{CommandRunner, Tofu};

use crate::error::HarnessError;

/// cleanup 액션이 반환하는 future
pub type CleanupFuture = Pin<Box<dyn Future<Output = Result<(), HarnessError>> + Send>>;

/// 등록된 teardown 액션 하나
pub struct CleanupAction {
    label: String,
    dir: Option<PathBuf>,
    run: Box<dyn FnOnce() -> CleanupFuture + Send>,
}

impl CleanupAction {
    pub fn new<F, Fut>(label: impl Into<String>, dir: Option<&Path>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            dir: dir.map(Path::to_path_buf),
            run: Box::new(move || Box::pin(action()) as CleanupFuture),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// LIFO teardown 스택
#[derive(Default)]
pub struct CleanupRegistry {
    actions: Mutex<Vec<CleanupAction>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 임의의 액션을 등록합니다.
    pub fn register<F, Fut>(&self, label: impl Into<String>, dir: Option<&Path>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        self.push(CleanupAction::new(label, dir, action));
    }

    fn push(&self, action: CleanupAction) {
        match self.actions.lock() {
            Ok(mut actions) => actions.push(action),
            Err(poisoned) => poisoned.into_inner().push(action),
        }
    }

    /// 모듈 핸들에 대한 `destroy -auto-approve`를 등록합니다.
    ///
    /// 핸들을 공유하므로 등록 이후 `set_var`로 바뀐 변수도 destroy 시점에 반영됩니다.
    pub fn defer_destroy<R: CommandRunner>(&self, tofu: &Arc<Tofu<R>>) {
        let tofu = Arc::clone(tofu);
        let label = format!("destroy {}", dir_label(tofu.dir()));
        let dir = tofu.dir().to_path_buf();
        self.register(label, Some(&dir), move || async move {
            tofu.destroy().await?;
            Ok::<(), HarnessError>(())
        });
    }

    /// 주어진 순서대로 등록합니다. teardown은 역순으로 일어납니다.
    pub fn defer_destroy_all<R: CommandRunner>(&self, modules: &[Arc<Tofu<R>>]) {
        for tofu in modules {
            self.defer_destroy(tofu);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 등록 순서대로의 레이블 목록
    pub fn labels(&self) -> Vec<String> {
        self.actions
            .lock()
            .map(|a| a.iter().map(|c| c.label.clone()).collect())
            .unwrap_or_default()
    }

    /// 스택을 비우고 모든 액션을 등록 역순으로 실행합니다.
    ///
    /// 두 번째 호출은 아무것도 하지 않습니다.
    pub async fn run_all(&self) -> CleanupReport {
        let drained = match self.actions.lock() {
            Ok(mut actions) => std::mem::take(&mut *actions),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let mut report = CleanupReport::default();
        for action in drained.into_iter().rev() {
            let CleanupAction { label, dir, run } = action;
            let dir_text = dir.as_ref().map(|d| d.display().to_string());

            info!(action = %label, "running cleanup");
            let status = match tokio::spawn(async move { run().await }).await {
                Ok(Ok(())) => CleanupStatus::Succeeded,
                Ok(Err(e)) => {
                    error!(action = %label, "CLEANUP ERROR (resources may be orphaned): {e}");
                    log_manual_cleanup(dir_text.as_deref());
                    CleanupStatus::Failed {
                        error: e.to_string(),
                    }
                }
                Err(join) if join.is_panic() => {
                    let message = panic_message(join.into_panic());
                    error!(action = %label, "CLEANUP PANIC (resources may be orphaned): {message}");
                    log_manual_cleanup(dir_text.as_deref());
                    CleanupStatus::Panicked { message }
                }
                Err(join) => {
                    error!(action = %label, "CLEANUP ERROR (resources may be orphaned): {join}");
                    log_manual_cleanup(dir_text.as_deref());
                    CleanupStatus::Failed {
                        error: join.to_string(),
                    }
                }
            };

            counter!(CLEANUP_ACTIONS_TOTAL, LABEL_RESULT => status.as_str()).increment(1);
            report.steps.push(CleanupStep {
                label,
                dir: dir_text,
                status,
            });
        }
        report
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        let pending: Vec<String> = match self.actions.get_mut() {
            Ok(actions) => actions.iter().map(|a| a.label.clone()).collect(),
            Err(poisoned) => poisoned
                .get_ref()
                .iter()
                .map(|a| a.label.clone())
                .collect(),
        };
        if !pending.is_empty() {
            warn!(
                actions = ?pending,
                "cleanup registry dropped with pending actions; resources may be orphaned"
            );
        }
    }
}

fn log_manual_cleanup(dir: Option<&str>) {
    if let Some(dir) = dir {
        error!("TerraformDir: {dir}");
    }
    error!("Manual cleanup may be required");
}

fn dir_label(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// panic payload에서 메시지를 꺼냅니다.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
