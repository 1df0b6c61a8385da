//! 하네스 에러 타입
//!
//! [`HarnessError`]는 테스트 본문과 cleanup 액션이 반환하는 에러입니다.
//! `Skipped`는 실패가 아니라 "건너뜀"으로 집계됩니다.

use infraguard_core::error::{InfraguardError, LifecycleError};
use infraguard_exec::ExecError;

/// 테스트 수명주기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 외부 명령 실패
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// 테스트를 건너뜀 (실패로 집계되지 않음)
    #[error("skipped: {0}")]
    Skipped(String),

    /// 검증 실패
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// 필수 설정 누락
    #[error("missing required setting: {0}")]
    MissingSetting(String),

    /// 모듈 스테이징 등 작업 디렉토리 에러
    #[error("workspace error: {0}")]
    Workspace(String),

    /// 시간 예산 부족 또는 초과
    #[error("timeout: {0}")]
    Timeout(String),

    /// 파일 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 디코딩 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

impl From<HarnessError> for InfraguardError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::Exec(e) => e.into(),
            HarnessError::Skipped(reason) => LifecycleError::Skipped(reason).into(),
            HarnessError::Assertion(msg) => LifecycleError::Assertion(msg).into(),
            HarnessError::MissingSetting(key) => LifecycleError::MissingSetting(key).into(),
            HarnessError::Workspace(msg) => LifecycleError::Workspace(msg).into(),
            HarnessError::Timeout(msg) => LifecycleError::Timeout(msg).into(),
            HarnessError::Io(e) => InfraguardError::Io(e),
            HarnessError::Json(e) => LifecycleError::Assertion(format!("invalid json: {e}")).into(),
        }
    }
}
