//! 도메인 타입 -- 테스트 결과와 cleanup 리포트
//!
//! 하네스가 생성하고 CLI가 렌더링하는 값 타입들입니다.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 테스트 케이스 하나의 최종 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// 본문이 에러 없이 완료됨
    Passed,
    /// 본문이 에러, panic 또는 시간 초과로 종료됨
    Failed,
    /// 시간 예산 부족 등으로 건너뜀
    Skipped,
}

impl Outcome {
    /// 메트릭 레이블 및 요약 출력용 고정 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// cleanup 액션 하나의 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CleanupStatus {
    /// 정상 완료
    Succeeded,
    /// 에러 반환 (리소스가 남아 있을 수 있음)
    Failed { error: String },
    /// panic 발생 (리소스가 남아 있을 수 있음)
    Panicked { message: String },
}

impl CleanupStatus {
    /// 메트릭 레이블용 고정 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Panicked { .. } => "panicked",
        }
    }
}

/// 실행된 cleanup 액션 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStep {
    /// 등록 시 지정한 레이블
    pub label: String,
    /// 관련 작업 디렉토리 (수동 정리 안내용)
    pub dir: Option<String>,
    /// 실행 결과
    #[serde(flatten)]
    pub status: CleanupStatus,
}

/// 한 테스트 범위의 cleanup 실행 결과 (실행 순서대로)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub steps: Vec<CleanupStep>,
}

impl CleanupReport {
    /// 모든 액션이 성공했는지 여부
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.status == CleanupStatus::Succeeded)
    }

    /// 실패하거나 panic이 발생한 액션들
    pub fn orphan_suspects(&self) -> impl Iterator<Item = &CleanupStep> {
        self.steps
            .iter()
            .filter(|s| s.status != CleanupStatus::Succeeded)
    }
}

/// 테스트 케이스 하나의 실행 리포트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// 테스트 이름 (`suite/case`)
    pub name: String,
    /// 최종 결과
    pub outcome: Outcome,
    /// 실패 또는 건너뜀 사유
    pub reason: Option<String>,
    /// 본문 + cleanup 전체 소요 시간 (밀리초)
    pub duration_ms: u64,
    /// cleanup 실행 결과
    pub cleanup: CleanupReport,
}

impl TestReport {
    /// 소요 시간을 `Duration`으로 반환합니다.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(label: &str, status: CleanupStatus) -> CleanupStep {
        CleanupStep {
            label: label.to_owned(),
            dir: None,
            status,
        }
    }

    #[test]
    fn empty_cleanup_report_is_clean() {
        assert!(CleanupReport::default().is_clean());
    }

    #[test]
    fn report_with_failure_lists_orphan_suspects() {
        let report = CleanupReport {
            steps: vec![
                step("bucket", CleanupStatus::Succeeded),
                step(
                    "vpc",
                    CleanupStatus::Failed {
                        error: "boom".to_owned(),
                    },
                ),
            ],
        };
        assert!(!report.is_clean());
        let suspects: Vec<_> = report.orphan_suspects().map(|s| s.label.as_str()).collect();
        assert_eq!(suspects, vec!["vpc"]);
    }

    #[test]
    fn cleanup_step_serializes_status_inline() {
        let json = serde_json::to_value(step(
            "gke",
            CleanupStatus::Panicked {
                message: "oops".to_owned(),
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "panicked");
        assert_eq!(json["message"], "oops");
        assert_eq!(json["label"], "gke");
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Outcome::Skipped).unwrap(),
            "\"skipped\""
        );
        assert_eq!(Outcome::Failed.to_string(), "failed");
    }
}
