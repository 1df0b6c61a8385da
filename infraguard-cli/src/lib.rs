//! # infraguard-cli
//!
//! `infraguard` 바이너리의 라이브러리 부분입니다.
//! 통합 테스트(`tests/`)가 명령 핸들러와 스위트를 직접 호출할 수 있도록
//! 모든 모듈을 공개합니다.
//!
//! # 구성 요소
//! - [`cli`]: clap 인자 정의
//! - [`commands`]: `run`, `list`, `config` 핸들러
//! - [`suites`]: 인프라 모듈별 통합 테스트 케이스 카탈로그
//! - [`output`]: text / JSON 출력 추상화
//! - [`logging`]: tracing subscriber 초기화

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod suites;
