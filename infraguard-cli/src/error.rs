//! CLI-specific error types and exit code mapping

use infraguard_core::error::InfraguardError;
use infraguard_harness::HarnessError;

/// `infraguard` 명령의 에러. [`CliError::exit_code`]로 종료 코드가 정해집니다.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// 설정 로드/검증 실패
    #[error("configuration error: {0}")]
    Config(String),

    /// 잘못된 선택자, 알 수 없는 섹션 등
    #[error("{0}")]
    Command(String),

    /// At least one selected test case failed.
    #[error("{0} test case(s) failed")]
    TestsFailed(usize),

    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 하네스/실행 계층에서 올라온 에러
    #[error("{0}")]
    Core(#[from] InfraguardError),
}

impl CliError {
    /// | code | 의미 |
    /// |------|------|
    /// | 1 | 명령 에러 |
    /// | 2 | 설정 에러 |
    /// | 3 | 실패한 테스트 케이스가 있음 |
    /// | 10 | IO 에러 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(InfraguardError::Config(_)) => 2,
            Self::TestsFailed(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(e: HarnessError) -> Self {
        Self::Core(e.into())
    }
}
