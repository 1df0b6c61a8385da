//! # infraguard-harness
//!
//! 인프라 통합 테스트의 수명주기를 관리합니다.
//!
//! # 구성 요소
//! - [`timeout`]: 최소 제한 시간 게이트와 본문 예산 계산
//! - [`cleanup`]: LIFO teardown 스택 (panic 격리, 실패 시 수동 정리 안내)
//! - [`scope`]: 게이트 → 본문 → cleanup을 묶는 [`TestScope`]
//! - [`adoption`]: 삭제 불가능한 KMS 리소스의 import / state rm 워크플로우
//! - [`workspace`]: 저장소 루트 탐색, 모듈 임시 복사, 고유 ID
//! - [`assert`]: `HarnessError::Assertion`을 반환하는 검증 헬퍼
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use infraguard_exec::{ProcessRunner, Tofu};
//! use infraguard_harness::{HarnessError, Layout, TestScope, TimeoutClass};
//!
//! # async fn example() {
//! let runner = Arc::new(ProcessRunner::new());
//! let report = TestScope::new("vpc/with_nat")
//!     .class(TimeoutClass::Vpc)
//!     .run(move |handle| async move {
//!         let staged = Layout::new("/srv/infra").stage_module("vpc").await?;
//!         let tofu = Arc::new(Tofu::new(runner, staged.path()));
//!         handle.defer_destroy(&tofu);
//!         tofu.init_and_apply().await?;
//!         Ok::<(), HarnessError>(())
//!     })
//!     .await;
//! println!("{}: {}", report.name, report.outcome);
//! # }
//! ```

pub mod adoption;
pub mod assert;
pub mod cleanup;
pub mod error;
pub mod scope;
pub mod timeout;
pub mod workspace;

pub use adoption::{AdoptionOutcome, AdoptionPlan, Adoptable, KmsNames, kms_bootstrap_plan};
pub use cleanup::{CleanupAction, CleanupRegistry};
pub use error::HarnessError;
pub use scope::{ScopeHandle, TestScope};
pub use timeout::{
    Deadline, Gate, TestTimeout, TimeoutClass, format_duration, parse_duration, require_minimum,
};
pub use workspace::{Layout, StagedModule, copy_module_to_temp, repo_root, unique_id};
