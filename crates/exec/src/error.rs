//! 명령 실행 에러 타입
//!
//! [`ExecError`]는 외부 CLI 실행 중 발생하는 모든 에러를 표현합니다.
//! `From<ExecError> for InfraguardError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::time::Duration;

use infraguard_core::error::{CommandError, InfraguardError};

/// 명령 실행 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// 프로세스 시작 실패 (바이너리 없음, 권한 등)
    #[error("failed to spawn '{program}': {reason}")]
    Spawn {
        /// 실행하려던 프로그램
        program: String,
        /// 실패 사유
        reason: String,
    },

    /// 0이 아닌 종료 코드
    #[error("'{command}' exited with code {code}: {}", .stderr.trim())]
    Failed {
        /// 실행한 명령줄 (로그용)
        command: String,
        /// 종료 코드 (시그널로 종료된 경우 -1)
        code: i32,
        /// 표준 출력
        stdout: String,
        /// 표준 에러
        stderr: String,
    },

    /// 제한 시간 초과 (프로세스는 종료됨)
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut {
        /// 실행한 명령줄
        command: String,
        /// 적용된 제한 시간
        timeout: Duration,
    },

    /// 명령 출력 해석 실패
    #[error("unexpected output from '{program}': {reason}")]
    Output {
        /// 출력을 낸 프로그램
        program: String,
        /// 해석 실패 사유
        reason: String,
    },

    /// 재시도 패턴 설정 오류
    #[error("invalid retry pattern '{pattern}': {reason}")]
    RetryPattern {
        /// 문제가 된 정규식
        pattern: String,
        /// 컴파일 실패 사유
        reason: String,
    },

    /// 변수 파일 기록 등 파일 I/O 실패
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화/역직렬화 실패
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExecError {
    /// 명령이 남긴 출력(stdout + stderr)을 반환합니다.
    ///
    /// 실행 자체가 실패한 경우에는 에러 메시지를 반환합니다.
    pub fn output_text(&self) -> String {
        match self {
            Self::Failed { stdout, stderr, .. } => format!("{stdout}\n{stderr}"),
            other => other.to_string(),
        }
    }
}

impl From<ExecError> for InfraguardError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Spawn { program, reason } => {
                InfraguardError::Command(CommandError::Spawn { program, reason })
            }
            ExecError::Failed {
                command,
                code,
                stderr,
                ..
            } => InfraguardError::Command(CommandError::Failed {
                program: command,
                code,
                stderr,
            }),
            ExecError::TimedOut { command, timeout } => {
                InfraguardError::Command(CommandError::TimedOut {
                    program: command,
                    timeout_secs: timeout.as_secs(),
                })
            }
            ExecError::Output { program, reason } => {
                InfraguardError::Command(CommandError::Output { program, reason })
            }
            ExecError::RetryPattern { pattern, reason } => {
                InfraguardError::Config(infraguard_core::error::ConfigError::InvalidValue {
                    field: "tofu.retryable_errors".to_owned(),
                    reason: format!("{pattern}: {reason}"),
                })
            }
            ExecError::Io(e) => InfraguardError::Io(e),
            ExecError::Json(e) => InfraguardError::Command(CommandError::Output {
                program: "json".to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}
