//! # infraguard-exec
//!
//! 외부 CLI 실행 계층입니다. 하네스와 테스트 스위트는 프로세스를 직접 띄우지 않고
//! [`CommandRunner`] trait을 통해서만 `tofu`, `gcloud`, `kubectl`을 호출합니다.
//!
//! # 구성 요소
//! - [`CommandRunner`] / [`ProcessRunner`]: 프로세스 실행 추상화와 실제 구현
//! - [`Tofu`]: 모듈 작업 디렉토리 핸들 (변수 파일, 인자 구성, 일시적 에러 재시도)
//! - [`Gcloud`]: 프로젝트 고정 gcloud 래퍼
//! - [`Kubectl`]: kubeconfig / namespace 고정 kubectl 래퍼
//! - `MockRunner`: 테스트용 스크립트 runner (`testing` feature)

pub mod error;
pub mod gcloud;
pub mod kubectl;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod runner;
pub mod tofu;

pub use error::ExecError;
pub use gcloud::{Gcloud, parse_gcloud_bool};
pub use kubectl::Kubectl;
#[cfg(any(test, feature = "testing"))]
pub use mock::{MockResponse, MockRunner};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use tofu::{RetryPolicy, Tofu, VAR_FILE_NAME};
