//! 테스트 범위 -- 시간 게이트, 본문 실행, cleanup을 하나의 수명주기로 묶습니다.
//!
//! # 실행 순서
//! 1. 시간 게이트 검사 (부족하면 아무것도 만들지 않고 `Skipped`)
//! 2. 본문 예산 계산 (공유 마감이 있으면 그 남은 시간에서, cleanup 예약분 제외, 부족하면 즉시 `Failed`)
//! 3. 본문을 별도 task에서 예산 안에서 실행
//! 4. 결과와 무관하게 cleanup registry 실행
//! 5. [`TestReport`] 반환

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tracing::{info, warn};

use infraguard_core::metrics::{LABEL_OUTCOME, TESTS_TOTAL};
use infraguard_core::{CleanupReport, Outcome, TestReport};
use infraguard_exec::{CommandRunner, Tofu};

use crate::cleanup::{CleanupRegistry, panic_message};
use crate::error::HarnessError;
use crate::timeout::{Deadline, Gate, TestTimeout, TimeoutClass, format_duration, require_minimum};

/// 기본 cleanup 예약 시간
pub const DEFAULT_CLEANUP_RESERVE: Duration = Duration::from_secs(120);

/// 테스트 하나의 수명주기 설정
#[derive(Debug, Clone)]
pub struct TestScope {
    name: String,
    timeout: TestTimeout,
    minimum: Duration,
    cleanup_reserve: Duration,
    /// 여러 테스트가 공유하는 실행 마감 (없으면 `run` 시작 시각부터 잼)
    deadline: Option<Deadline>,
}

impl TestScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: TestTimeout::default(),
            minimum: TimeoutClass::Default.minimum(),
            cleanup_reserve: DEFAULT_CLEANUP_RESERVE,
            deadline: None,
        }
    }

    pub fn timeout(mut self, timeout: TestTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn class(mut self, class: TimeoutClass) -> Self {
        self.minimum = class.minimum();
        self
    }

    pub fn minimum(mut self, minimum: Duration) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn cleanup_reserve(mut self, reserve: Duration) -> Self {
        self.cleanup_reserve = reserve;
        self
    }

    /// 본문 예산을 이 마감의 남은 시간에서 계산합니다.
    ///
    /// 최소 요구치 검사는 여전히 설정된 제한 시간과 비교합니다.
    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 본문을 실행하고 등록된 cleanup을 모두 수행한 뒤 리포트를 반환합니다.
    pub async fn run<F, Fut>(self, body: F) -> TestReport
    where
        F: FnOnce(ScopeHandle) -> Fut,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        let started = Instant::now();

        if let Gate::Skip { reason } = require_minimum(self.timeout, self.minimum) {
            info!(test = %self.name, reason = %reason, "skipping test");
            return self.finish(started, Outcome::Skipped, Some(reason), CleanupReport::default());
        }

        let deadline = self
            .deadline
            .unwrap_or_else(|| Deadline::start(self.timeout));
        let budget = match deadline.body_budget(self.cleanup_reserve) {
            Ok(budget) => budget,
            Err(e) => {
                warn!(test = %self.name, error = %e, "not enough time to run the test body");
                return self.finish(
                    started,
                    Outcome::Failed,
                    Some(e.to_string()),
                    CleanupReport::default(),
                );
            }
        };

        let registry = Arc::new(CleanupRegistry::new());
        let handle = ScopeHandle {
            name: Arc::from(self.name.as_str()),
            registry: Arc::clone(&registry),
        };

        info!(
            test = %self.name,
            timeout = %self.timeout,
            body_budget = %budget.map(format_duration).unwrap_or_else(|| "unlimited".to_owned()),
            "starting test"
        );

        let mut task = tokio::spawn(body(handle));
        let joined = match budget {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    task.abort();
                    let _ = (&mut task).await;
                    None
                }
            },
            None => Some((&mut task).await),
        };

        let (outcome, reason) = match joined {
            Some(Ok(Ok(()))) => (Outcome::Passed, None),
            Some(Ok(Err(e))) if e.is_skip() => {
                let reason = match e {
                    HarnessError::Skipped(reason) => reason,
                    other => other.to_string(),
                };
                (Outcome::Skipped, Some(reason))
            }
            Some(Ok(Err(e))) => (Outcome::Failed, Some(e.to_string())),
            Some(Err(join)) if join.is_panic() => (
                Outcome::Failed,
                Some(format!("panicked: {}", panic_message(join.into_panic()))),
            ),
            Some(Err(join)) => (Outcome::Failed, Some(join.to_string())),
            None => (
                Outcome::Failed,
                Some(format!(
                    "test body exceeded its budget of {} (cleanup reserve {})",
                    budget.map(format_duration).unwrap_or_default(),
                    format_duration(self.cleanup_reserve),
                )),
            ),
        };

        if let Some(reason) = &reason {
            match outcome {
                Outcome::Failed => warn!(test = %self.name, reason = %reason, "test failed"),
                _ => info!(test = %self.name, reason = %reason, "test skipped"),
            }
        }

        let cleanup = registry.run_all().await;
        if !cleanup.is_clean() {
            warn!(
                test = %self.name,
                suspects = cleanup.orphan_suspects().count(),
                "cleanup finished with errors"
            );
        }

        self.finish(started, outcome, reason, cleanup)
    }

    fn finish(
        &self,
        started: Instant,
        outcome: Outcome,
        reason: Option<String>,
        cleanup: CleanupReport,
    ) -> TestReport {
        counter!(TESTS_TOTAL, LABEL_OUTCOME => outcome.as_str()).increment(1);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(test = %self.name, outcome = %outcome, duration_ms, "test finished");
        TestReport {
            name: self.name.clone(),
            outcome,
            reason,
            duration_ms,
            cleanup,
        }
    }
}

/// 테스트 본문에 전달되는 핸들
///
/// 복제해서 여러 곳에 넘겨도 같은 registry에 등록됩니다.
#[derive(Clone)]
pub struct ScopeHandle {
    name: Arc<str>,
    registry: Arc<CleanupRegistry>,
}

impl ScopeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register<F, Fut>(&self, label: impl Into<String>, dir: Option<&Path>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        self.registry.register(label, dir, action);
    }

    pub fn defer_destroy<R: CommandRunner>(&self, tofu: &Arc<Tofu<R>>) {
        self.registry.defer_destroy(tofu);
    }

    pub fn defer_destroy_all<R: CommandRunner>(&self, modules: &[Arc<Tofu<R>>]) {
        self.registry.defer_destroy_all(modules);
    }

    /// 본문에서 `return Err(handle.skip(..))` 형태로 사용합니다.
    pub fn skip(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::Skipped(reason.into())
    }

    pub fn log(&self, message: impl AsRef<str>) {
        info!(test = %self.name, "{}", message.as_ref());
    }

    /// 지금까지 등록된 cleanup 레이블 (등록 순서)
    pub fn pending_cleanups(&self) -> Vec<String> {
        self.registry.labels()
    }
}
