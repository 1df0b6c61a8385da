//! 에러 타입 -- 도메인별 에러 정의

/// infraguard 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum InfraguardError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 외부 명령(tofu, gcloud, kubectl) 실행 에러
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// 테스트 수명주기 에러
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 외부 명령 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// 프로세스를 시작하지 못함 (바이너리 없음 등)
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// 0이 아닌 종료 코드
    #[error("'{program}' exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// 제한 시간 초과
    #[error("'{program}' timed out after {timeout_secs}s")]
    TimedOut { program: String, timeout_secs: u64 },

    /// 명령 출력 해석 실패
    #[error("unexpected output from '{program}': {reason}")]
    Output { program: String, reason: String },
}

/// 테스트 수명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// 테스트가 건너뛰어짐
    #[error("skipped: {0}")]
    Skipped(String),

    /// 검증 실패
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// 필수 설정 누락
    #[error("missing required setting: {0}")]
    MissingSetting(String),

    /// 작업 디렉토리 준비 실패
    #[error("workspace error: {0}")]
    Workspace(String),

    /// 시간 예산 부족 또는 초과
    #[error("timeout: {0}")]
    Timeout(String),
}
