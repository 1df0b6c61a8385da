//! 통합 테스트 스위트
//!
//! 각 케이스는 `async fn(ctx, handle) -> Result<(), HarnessError>` 형태이며
//! [`catalogue`]에 등록됩니다. 케이스는 리소스를 만들기 전에 해당 리소스의
//! teardown을 [`ScopeHandle`]에 등록해야 합니다.
//!
//! | suite | cases |
//! |-------|-------|
//! | bootstrap | smoke |
//! | vpc | with_nat, without_nat |
//! | gke | create (slow), plan_only |
//! | backup_bucket | create, without_versioning |
//! | secrets | create, with_accessors, multiple |
//! | wif | create, precondition |
//! | service_accounts | create |
//! | audit_logging | create, disabled |
//! | neo4j | e2e (end-to-end) |

pub mod audit_logging;
pub mod backup_bucket;
pub mod bootstrap;
pub mod gke;
pub mod neo4j;
pub mod secrets;
pub mod service_accounts;
pub mod vpc;
pub mod wif;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use infraguard_core::InfraguardConfig;
use infraguard_exec::{CommandRunner, Gcloud, Kubectl, ProcessRunner, Tofu};
use infraguard_harness::{HarnessError, Layout, ScopeHandle, StagedModule, TimeoutClass};

/// 케이스 본문이 반환하는 future
pub type CaseFuture = Pin<Box<dyn Future<Output = Result<(), HarnessError>> + Send>>;

/// 케이스 본문
pub type CaseFn<R> = fn(Arc<SuiteContext<R>>, ScopeHandle) -> CaseFuture;

/// 카탈로그 항목의 메타데이터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseInfo {
    pub suite: &'static str,
    pub name: &'static str,
    pub class: TimeoutClass,
    /// `--short`에서 건너뛸 때의 사유 (있으면 느린 케이스)
    pub slow: Option<&'static str>,
    /// `--e2e`가 있을 때만 실행
    pub e2e: bool,
    pub description: &'static str,
}

impl CaseInfo {
    /// `suite/name`
    pub fn id(&self) -> String {
        format!("{}/{}", self.suite, self.name)
    }
}

/// 실행 가능한 케이스
pub struct Case<R: CommandRunner> {
    pub info: CaseInfo,
    pub run: CaseFn<R>,
}

impl<R: CommandRunner> Case<R> {
    /// 실행 옵션에 따른 건너뛰기를 먼저 판단한 뒤 본문을 실행합니다.
    pub fn invoke(&self, ctx: Arc<SuiteContext<R>>, handle: ScopeHandle) -> CaseFuture {
        if self.info.e2e && !ctx.options.e2e {
            return skipped(handle, "end-to-end test; run with --e2e to enable");
        }
        if let (Some(reason), true) = (self.info.slow, ctx.options.short) {
            return skipped(handle, reason);
        }
        (self.run)(ctx, handle)
    }

    pub(crate) fn slow(mut self, reason: &'static str) -> Self {
        self.info.slow = Some(reason);
        self
    }

    pub(crate) fn e2e(mut self) -> Self {
        self.info.e2e = true;
        self
    }
}

fn skipped(handle: ScopeHandle, reason: &str) -> CaseFuture {
    let err = handle.skip(reason);
    Box::pin(async move { Err(err) })
}

/// 전체 케이스 카탈로그 (실행 순서)
pub fn catalogue<R: CommandRunner>() -> Vec<Case<R>> {
    let mut cases = Vec::new();
    cases.extend(bootstrap::cases());
    cases.extend(vpc::cases());
    cases.extend(gke::cases());
    cases.extend(backup_bucket::cases());
    cases.extend(secrets::cases());
    cases.extend(wif::cases());
    cases.extend(service_accounts::cases());
    cases.extend(audit_logging::cases());
    cases.extend(neo4j::cases());
    cases
}

/// 카탈로그 메타데이터만 필요한 경우 (`list`)
pub fn case_infos() -> Vec<CaseInfo> {
    catalogue::<ProcessRunner>()
        .into_iter()
        .map(|c| c.info)
        .collect()
}

/// `run` 플래그에서 온 실행 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    pub short: bool,
    pub e2e: bool,
}

/// 모든 케이스가 공유하는 실행 환경
pub struct SuiteContext<R: CommandRunner> {
    runner: Arc<R>,
    config: InfraguardConfig,
    layout: Layout,
    options: RunOptions,
    fixed_id: Option<String>,
}

impl<R: CommandRunner> SuiteContext<R> {
    pub fn new(runner: Arc<R>, config: InfraguardConfig, layout: Layout, options: RunOptions) -> Self {
        Self {
            runner,
            config,
            layout,
            options,
            fixed_id: None,
        }
    }

    /// 리소스 이름 접미어를 고정합니다 (스크립트된 출력과 비교하는 테스트용).
    pub fn with_fixed_id(mut self, id: impl Into<String>) -> Self {
        self.fixed_id = Some(id.into());
        self
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    pub fn config(&self) -> &InfraguardConfig {
        &self.config
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// 리소스 이름에 붙일 소문자 접미어
    pub fn unique_id(&self) -> String {
        self.fixed_id
            .clone()
            .unwrap_or_else(infraguard_harness::unique_id)
    }

    /// `gcp.project_id` (비어 있으면 에러)
    pub fn project(&self) -> Result<String, HarnessError> {
        required(&self.config.gcp.project_id, "gcp.project_id")
    }

    pub fn region(&self) -> &str {
        &self.config.gcp.region
    }

    /// `gcp.state_bucket_location` (bootstrap 전용, 비어 있으면 에러)
    pub fn state_bucket_location(&self) -> Result<String, HarnessError> {
        required(
            &self.config.gcp.state_bucket_location,
            "gcp.state_bucket_location",
        )
    }

    pub fn gcloud(&self, project: &str) -> Gcloud<R> {
        Gcloud::new(Arc::clone(&self.runner), project)
            .with_binary(&self.config.tofu.gcloud_binary)
            .with_timeout(self.config.tofu.command_timeout())
    }

    pub fn kubectl(&self, kubeconfig: &Path) -> Kubectl<R> {
        Kubectl::new(Arc::clone(&self.runner), kubeconfig)
            .with_binary(&self.config.tofu.kubectl_binary)
    }

    /// `[tofu]` 설정을 적용한 모듈 핸들. 프로젝트가 설정되어 있으면
    /// `GOOGLE_PROJECT`도 함께 전달합니다.
    pub fn tofu(&self, dir: &Path) -> Result<Tofu<R>, HarnessError> {
        let tofu = Tofu::from_config(Arc::clone(&self.runner), dir, &self.config.tofu)?;
        let project = self.config.gcp.project_id.trim();
        Ok(if project.is_empty() {
            tofu
        } else {
            tofu.with_env("GOOGLE_PROJECT", project)
        })
    }

    /// `infra/modules/<name>`을 스테이징하고 핸들을 반환합니다.
    ///
    /// 임시 디렉토리 삭제가 cleanup으로 먼저 등록되므로, 이후에 등록하는
    /// destroy가 항상 디렉토리 삭제보다 먼저 실행됩니다.
    pub async fn stage_module(
        &self,
        handle: &ScopeHandle,
        name: &str,
    ) -> Result<Arc<Tofu<R>>, HarnessError> {
        let staged = self.layout.stage_module(name).await?;
        self.adopt_staged(handle, name, staged)
    }

    /// `infra/apps/<name>`을 스테이징합니다 (예: `neo4j/test`).
    pub async fn stage_app(
        &self,
        handle: &ScopeHandle,
        name: &str,
    ) -> Result<Arc<Tofu<R>>, HarnessError> {
        let staged = self.layout.stage_app(name).await?;
        self.adopt_staged(handle, name, staged)
    }

    fn adopt_staged(
        &self,
        handle: &ScopeHandle,
        name: &str,
        staged: StagedModule,
    ) -> Result<Arc<Tofu<R>>, HarnessError> {
        let tofu = Arc::new(self.tofu(staged.path())?);
        let dir = staged.path().to_path_buf();
        handle.register(format!("remove staged {name}"), Some(&dir), move || staged.remove());
        Ok(tofu)
    }
}

fn required(value: &str, key: &str) -> Result<String, HarnessError> {
    let value = value.trim();
    if value.is_empty() {
        Err(HarnessError::MissingSetting(key.to_owned()))
    } else {
        Ok(value.to_owned())
    }
}

/// JSON 객체의 모든 키를 모듈 변수로 설정합니다.
pub(crate) fn set_vars<R: CommandRunner>(tofu: &Tofu<R>, vars: Value) {
    if let Value::Object(map) = vars {
        for (key, value) in map {
            tofu.set_var(key, value);
        }
    }
}

/// 서비스 계정 이메일
pub(crate) fn sa_email(account_id: &str, project: &str) -> String {
    format!("{account_id}@{project}.iam.gserviceaccount.com")
}

/// 케이스 등록용 생성자
pub(crate) fn case<R: CommandRunner>(
    suite: &'static str,
    name: &'static str,
    class: TimeoutClass,
    description: &'static str,
    run: CaseFn<R>,
) -> Case<R> {
    Case {
        info: CaseInfo {
            suite,
            name,
            class,
            slow: None,
            e2e: false,
            description,
        },
        run,
    }
}
