//! 시간 게이트 -- 테스트 시간 예산 검사
//!
//! 리소스를 만들기 전에 설정된 테스트 제한 시간이 해당 테스트의 최소 요구치를
//! 만족하는지 확인합니다. 부족하면 아무것도 만들지 않고 건너뜁니다.
//! 본문 실행 시간은 cleanup 예약분을 뺀 나머지로 제한되어,
//! 본문이 시간을 다 써도 teardown할 시간이 남습니다.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::HarnessError;

/// 테스트 종류별 최소 제한 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// 일반 모듈 테스트 (10분)
    Default,
    /// VPC 테스트 (15분)
    Vpc,
    /// GKE 클러스터 테스트 (30분)
    Gke,
    /// 전체 스택 e2e 테스트 (45분)
    Neo4j,
}

impl TimeoutClass {
    pub fn minimum(&self) -> Duration {
        match self {
            Self::Default => Duration::from_secs(10 * 60),
            Self::Vpc => Duration::from_secs(15 * 60),
            Self::Gke => Duration::from_secs(30 * 60),
            Self::Neo4j => Duration::from_secs(45 * 60),
        }
    }
}

/// 설정된 테스트 제한 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestTimeout {
    /// 제한 없음 (`0`으로 설정)
    Unlimited,
    /// 고정 제한 시간
    Limited(Duration),
}

impl TestTimeout {
    /// 초 단위 설정값을 해석합니다. `0`은 무제한입니다.
    pub fn from_secs(secs: u64) -> Self {
        Self::from_duration(Duration::from_secs(secs))
    }

    pub fn from_duration(d: Duration) -> Self {
        if d.is_zero() {
            Self::Unlimited
        } else {
            Self::Limited(d)
        }
    }
}

impl Default for TestTimeout {
    fn default() -> Self {
        Self::Limited(TimeoutClass::Default.minimum())
    }
}

impl fmt::Display for TestTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Limited(d) => f.write_str(&format_duration(*d)),
        }
    }
}

/// 게이트 판정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Skip { reason: String },
}

/// 제한 시간이 최소 요구치보다 짧으면 `Skip`을 반환합니다.
pub fn require_minimum(timeout: TestTimeout, minimum: Duration) -> Gate {
    match timeout {
        TestTimeout::Limited(limit) if limit < minimum => Gate::Skip {
            reason: format!(
                "test timeout ({}) is less than minimum required ({}). Run with --timeout={} or higher.",
                format_duration(limit),
                format_duration(minimum),
                format_duration(minimum),
            ),
        },
        _ => Gate::Proceed,
    }
}

/// 테스트 시작 시각과 전체 예산
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// 지금부터 시간을 잽니다.
    pub fn start(timeout: TestTimeout) -> Self {
        Self {
            started: Instant::now(),
            budget: match timeout {
                TestTimeout::Unlimited => None,
                TestTimeout::Limited(d) => Some(d),
            },
        }
    }

    /// 전체 마감까지 남은 시간 (`None`이면 무제한)
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|b| b.saturating_sub(self.started.elapsed()))
    }

    /// cleanup 예약분을 제외한 본문 실행 가능 시간
    ///
    /// # Errors
    ///
    /// 예약분이 남은 시간을 모두 차지하면 `HarnessError::Timeout`을 반환합니다.
    pub fn body_budget(&self, cleanup_reserve: Duration) -> Result<Option<Duration>, HarnessError> {
        let Some(remaining) = self.remaining() else {
            return Ok(None);
        };
        if cleanup_reserve >= remaining {
            return Err(HarnessError::Timeout(format!(
                "cleanup reserve ({}) leaves no time for the test body (remaining {})",
                format_duration(cleanup_reserve),
                format_duration(remaining),
            )));
        }
        Ok(Some(remaining - cleanup_reserve))
    }
}

/// `1h30m0s`, `10m0s`, `45s` 형태로 출력합니다.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    if total == 0 && d.subsec_millis() > 0 {
        return format!("{}ms", d.subsec_millis());
    }
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// CLI 제한 시간 인자를 해석합니다.
///
/// 허용 형식: `0`, `600` (초), `45s`, `30m`, `1h30m`, `1h30m0s`, `500ms`
pub fn parse_duration(input: &str) -> Result<Duration, HarnessError> {
    let input = input.trim();
    let invalid = || HarnessError::Timeout(format!("invalid duration '{input}'"));

    if input.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(value)),
            "ms" => Some(Duration::from_millis(value)),
            _ => return Err(invalid()),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(invalid)?;
    }
    Ok(total)
}
