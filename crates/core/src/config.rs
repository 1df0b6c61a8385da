//! 설정 관리 -- infraguard.toml 파싱 및 런타임 설정
//!
//! [`InfraguardConfig`]는 하네스 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`INFRAGUARD_GCP_PROJECT_ID=my-project` 형식)
//! 3. 설정 파일 (`infraguard.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), infraguard_core::error::InfraguardError> {
//! use infraguard_core::config::InfraguardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = InfraguardConfig::load("infraguard.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = InfraguardConfig::parse("[gcp]\nproject_id = \"demo\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, InfraguardError};

/// infraguard 통합 설정
///
/// `infraguard.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraguardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// GCP 프로젝트 설정
    #[serde(default)]
    pub gcp: GcpConfig,
    /// tofu / gcloud / kubectl 실행 설정
    #[serde(default)]
    pub tofu: TofuConfig,
    /// 저장소 레이아웃 설정
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// 테스트 시간 예산 설정
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl InfraguardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InfraguardError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, InfraguardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InfraguardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                InfraguardError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, InfraguardError> {
        toml::from_str(toml_str).map_err(|e| {
            InfraguardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `INFRAGUARD_{SECTION}_{FIELD}`
    /// 예: `INFRAGUARD_TIMEOUTS_TEST_TIMEOUT_SECS=2700`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "INFRAGUARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "INFRAGUARD_GENERAL_LOG_FORMAT");

        // GCP
        override_string(&mut self.gcp.project_id, "INFRAGUARD_GCP_PROJECT_ID");
        override_string(&mut self.gcp.region, "INFRAGUARD_GCP_REGION");
        override_string(
            &mut self.gcp.state_bucket_location,
            "INFRAGUARD_GCP_STATE_BUCKET_LOCATION",
        );

        // Tofu
        override_string(&mut self.tofu.binary, "INFRAGUARD_TOFU_BINARY");
        override_string(&mut self.tofu.gcloud_binary, "INFRAGUARD_TOFU_GCLOUD_BINARY");
        override_string(
            &mut self.tofu.kubectl_binary,
            "INFRAGUARD_TOFU_KUBECTL_BINARY",
        );
        override_u32(&mut self.tofu.max_retries, "INFRAGUARD_TOFU_MAX_RETRIES");
        override_u64(
            &mut self.tofu.retry_backoff_secs,
            "INFRAGUARD_TOFU_RETRY_BACKOFF_SECS",
        );
        override_u64(
            &mut self.tofu.command_timeout_secs,
            "INFRAGUARD_TOFU_COMMAND_TIMEOUT_SECS",
        );
        override_csv(
            &mut self.tofu.retryable_errors,
            "INFRAGUARD_TOFU_RETRYABLE_ERRORS",
        );

        // Workspace
        override_string(&mut self.workspace.repo_root, "INFRAGUARD_WORKSPACE_REPO_ROOT");
        override_string(
            &mut self.workspace.modules_dir,
            "INFRAGUARD_WORKSPACE_MODULES_DIR",
        );
        override_string(&mut self.workspace.envs_dir, "INFRAGUARD_WORKSPACE_ENVS_DIR");
        override_string(&mut self.workspace.apps_dir, "INFRAGUARD_WORKSPACE_APPS_DIR");

        // Timeouts
        override_u64(
            &mut self.timeouts.test_timeout_secs,
            "INFRAGUARD_TIMEOUTS_TEST_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.timeouts.cleanup_reserve_secs,
            "INFRAGUARD_TIMEOUTS_CLEANUP_RESERVE_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), InfraguardError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.gcp.region.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gcp.region".to_owned(),
                reason: "region must not be empty".to_owned(),
            }
            .into());
        }

        for (field, value) in [
            ("tofu.binary", &self.tofu.binary),
            ("tofu.gcloud_binary", &self.tofu.gcloud_binary),
            ("tofu.kubectl_binary", &self.tofu.kubectl_binary),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "binary name must not be empty".to_owned(),
                }
                .into());
            }
        }

        // 재시도 패턴은 정규식으로 컴파일 가능해야 함
        for pattern in &self.tofu.retryable_errors {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::InvalidValue {
                    field: "tofu.retryable_errors".to_owned(),
                    reason: format!("invalid pattern '{pattern}': {e}"),
                }
                .into());
            }
        }

        // 테스트 시간이 제한된 경우 cleanup 예약 시간은 그보다 작아야 함
        if self.timeouts.test_timeout_secs > 0
            && self.timeouts.cleanup_reserve_secs >= self.timeouts.test_timeout_secs
        {
            return Err(ConfigError::InvalidValue {
                field: "timeouts.cleanup_reserve_secs".to_owned(),
                reason: format!(
                    "must be less than timeouts.test_timeout_secs ({})",
                    self.timeouts.test_timeout_secs
                ),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// GCP 프로젝트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// 테스트 대상 프로젝트 ID (비어 있으면 프로젝트가 필요한 테스트는 실패)
    pub project_id: String,
    /// 리소스 리전
    pub region: String,
    /// 상태 버킷 및 KMS 위치 (bootstrap 테스트 전용)
    pub state_bucket_location: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            region: "us-central1".to_owned(),
            state_bucket_location: String::new(),
        }
    }
}

/// 외부 CLI 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TofuConfig {
    /// tofu 바이너리
    pub binary: String,
    /// gcloud 바이너리
    pub gcloud_binary: String,
    /// kubectl 바이너리
    pub kubectl_binary: String,
    /// 일시적 에러에 대한 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본 간격 (초)
    pub retry_backoff_secs: u64,
    /// 명령 하나의 제한 시간 (초, 0이면 무제한)
    pub command_timeout_secs: u64,
    /// 재시도 대상 에러 메시지 패턴 (정규식)
    pub retryable_errors: Vec<String>,
}

impl TofuConfig {
    /// 재시도 백오프 기본 간격
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    /// 명령 제한 시간 (`None`이면 무제한)
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

impl Default for TofuConfig {
    fn default() -> Self {
        Self {
            binary: "tofu".to_owned(),
            gcloud_binary: "gcloud".to_owned(),
            kubectl_binary: "kubectl".to_owned(),
            max_retries: 3,
            retry_backoff_secs: 5,
            command_timeout_secs: 0,
            retryable_errors: default_retryable_errors(),
        }
    }
}

/// 네트워크 및 provider 설치 과정의 일시적 에러 패턴
pub fn default_retryable_errors() -> Vec<String> {
    [
        "read: connection reset by peer",
        "transport is closing",
        "unable to verify signature",
        "unable to verify checksum",
        "no provider exists with the given name",
        "registry service is unreachable",
        "Error installing provider",
        "Failed to query available provider packages",
        "timeout while waiting for plugin to start",
        "timed out waiting for server handshake",
        "could not query provider registry for",
        "Provider produced inconsistent result after apply",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

/// 저장소 레이아웃 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// 저장소 루트 (비어 있으면 `.git`을 찾아 상위로 탐색)
    pub repo_root: String,
    /// 재사용 모듈 디렉토리 (루트 기준 상대 경로)
    pub modules_dir: String,
    /// 환경 디렉토리
    pub envs_dir: String,
    /// 애플리케이션 레이어 디렉토리
    pub apps_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo_root: String::new(),
            modules_dir: "infra/modules".to_owned(),
            envs_dir: "infra/envs".to_owned(),
            apps_dir: "infra/apps".to_owned(),
        }
    }
}

/// 테스트 시간 예산 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// 테스트 하나의 전체 제한 시간 (초, 0이면 무제한)
    pub test_timeout_secs: u64,
    /// 본문 실행에서 제외하여 cleanup에 남겨 둘 시간 (초)
    pub cleanup_reserve_secs: u64,
}

impl TimeoutsConfig {
    /// cleanup 예약 시간
    pub fn cleanup_reserve(&self) -> Duration {
        Duration::from_secs(self.cleanup_reserve_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: 600,
            cleanup_reserve_secs: 120,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
