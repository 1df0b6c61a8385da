//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `infraguard_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(
//!     infraguard_core::metrics::TESTS_TOTAL,
//!     infraguard_core::metrics::LABEL_OUTCOME => "passed"
//! )
//! .increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 실행 프로그램 레이블 키 (tofu, gcloud, kubectl)
pub const LABEL_PROGRAM: &str = "program";

/// 결과 레이블 키 (success, failure, timeout)
pub const LABEL_RESULT: &str = "result";

/// 테스트 결과 레이블 키 (passed, failed, skipped)
pub const LABEL_OUTCOME: &str = "outcome";

// ─── 명령 실행 메트릭 ───────────────────────────────────────────────

/// 실행된 외부 명령 수 (counter, labels: program, result)
pub const COMMANDS_TOTAL: &str = "infraguard_commands_total";

/// 일시적 에러로 인한 tofu 재시도 수 (counter)
pub const COMMAND_RETRIES_TOTAL: &str = "infraguard_command_retries_total";

// ─── 하네스 메트릭 ─────────────────────────────────────────────────

/// 실행된 cleanup 액션 수 (counter, label: result)
pub const CLEANUP_ACTIONS_TOTAL: &str = "infraguard_cleanup_actions_total";

/// 완료된 테스트 수 (counter, label: outcome)
pub const TESTS_TOTAL: &str = "infraguard_tests_total";

/// 전체 메트릭 이름 목록
pub const ALL_METRIC_NAMES: [&str; 4] = [
    COMMANDS_TOTAL,
    COMMAND_RETRIES_TOTAL,
    CLEANUP_ACTIONS_TOTAL,
    TESTS_TOTAL,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 레코더가 설치되지 않은 경우 아무 동작도 하지 않습니다.
pub fn describe_all() {
    use metrics::describe_counter;

    describe_counter!(
        COMMANDS_TOTAL,
        "External commands executed, by program and result"
    );
    describe_counter!(
        COMMAND_RETRIES_TOTAL,
        "tofu invocations retried after a transient error"
    );
    describe_counter!(
        CLEANUP_ACTIONS_TOTAL,
        "Deferred cleanup actions executed, by result"
    );
    describe_counter!(TESTS_TOTAL, "Test cases completed, by outcome");
}
