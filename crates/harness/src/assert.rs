//! 출력 검증 헬퍼
//!
//! 테스트 본문에서 panic 대신 `?`로 전파할 수 있도록
//! 실패 시 [`HarnessError::Assertion`]을 반환합니다.

use infraguard_exec::parse_gcloud_bool;

use crate::error::HarnessError;

/// 앞뒤 공백을 제거한 값이 같은지 확인합니다.
pub fn expect_eq(field: &str, expected: &str, actual: &str) -> Result<(), HarnessError> {
    if expected.trim() == actual.trim() {
        Ok(())
    } else {
        Err(HarnessError::Assertion(format!(
            "{field}: expected '{}', got '{}'",
            expected.trim(),
            actual.trim()
        )))
    }
}

pub fn expect_contains(field: &str, haystack: &str, needle: &str) -> Result<(), HarnessError> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(HarnessError::Assertion(format!(
            "{field}: expected to contain '{needle}', got '{}'",
            truncate(haystack)
        )))
    }
}

pub fn expect_not_empty(field: &str, value: &str) -> Result<(), HarnessError> {
    if value.trim().is_empty() {
        Err(HarnessError::Assertion(format!("{field}: expected a value, got empty")))
    } else {
        Ok(())
    }
}

pub fn expect_empty(field: &str, value: &str) -> Result<(), HarnessError> {
    if value.trim().is_empty() {
        Ok(())
    } else {
        Err(HarnessError::Assertion(format!(
            "{field}: expected empty, got '{}'",
            value.trim()
        )))
    }
}

/// gcloud `value(...)` 출력을 boolean으로 해석해 비교합니다.
pub fn expect_gcloud_bool(field: &str, out: &str, expected: bool) -> Result<(), HarnessError> {
    let actual = parse_gcloud_bool(out)
        .map_err(|e| HarnessError::Assertion(format!("{field}: {e}")))?;
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::Assertion(format!(
            "{field}: expected {expected}, got {actual}"
        )))
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 300;
    if s.chars().count() <= MAX {
        s.to_owned()
    } else {
        let head: String = s.chars().take(MAX).collect();
        format!("{head}...")
    }
}
