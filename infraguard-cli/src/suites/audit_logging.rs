//! 감사 로그 모듈 (로그 버킷 + 데이터 접근 감사 설정)

use std::sync::Arc;

use serde_json::json;

use infraguard_exec::CommandRunner;
use infraguard_harness::assert::{expect_eq, expect_gcloud_bool};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, set_vars};

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "audit_logging",
            "create",
            TimeoutClass::Default,
            "hardened log bucket with KMS and GCS audit configs",
            |ctx, h| Box::pin(create(ctx, h)),
        ),
        case(
            "audit_logging",
            "disabled",
            TimeoutClass::Default,
            "log bucket only, audit configs switched off",
            |ctx, h| Box::pin(disabled(ctx, h)),
        ),
    ]
}

async fn create<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let bucket_name = format!("{project}-audit-test-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "audit_logging").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "logs_bucket_name": bucket_name,
            "logs_bucket_location": "US",
            "enable_kms_audit_logs": true,
            "enable_gcs_audit_logs": true,
            "log_retention_days": 30,
            "labels": { "test": "true" },
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    expect_eq(
        "logs_bucket_name",
        &bucket_name,
        &tofu.output("logs_bucket_name").await?,
    )?;
    expect_eq(
        "logs_bucket_url",
        &format!("gs://{bucket_name}"),
        &tofu.output("logs_bucket_url").await?,
    )?;

    let gcloud = ctx.gcloud(&project);
    let url = format!("gs://{bucket_name}");
    let describe = |format: &'static str| {
        let gcloud = gcloud.clone();
        let url = url.clone();
        async move {
            gcloud
                .run(&["storage", "buckets", "describe", &url, format])
                .await
        }
    };

    expect_eq("bucket", &bucket_name, &describe("--format=value(name)").await?)?;
    expect_gcloud_bool(
        "iamConfiguration.uniformBucketLevelAccess.enabled",
        &describe("--format=value(iamConfiguration.uniformBucketLevelAccess.enabled)").await?,
        true,
    )?;
    expect_eq(
        "iamConfiguration.publicAccessPrevention",
        "enforced",
        &describe("--format=value(iamConfiguration.publicAccessPrevention)")
            .await?
            .to_lowercase(),
    )?;
    expect_eq("labels.test", "true", &describe("--format=value(labels.test)").await?)
}

async fn disabled<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let bucket_name = format!("{project}-audit-disabled-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "audit_logging").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "logs_bucket_name": bucket_name,
            "logs_bucket_location": "US",
            "enable_kms_audit_logs": false,
            "enable_gcs_audit_logs": false,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    expect_eq(
        "logs_bucket_name",
        &bucket_name,
        &tofu.output("logs_bucket_name").await?,
    )?;
    expect_eq(
        "kms_audit_logs_enabled",
        "false",
        &tofu.output("kms_audit_logs_enabled").await?,
    )?;
    expect_eq(
        "gcs_audit_logs_enabled",
        "false",
        &tofu.output("gcs_audit_logs_enabled").await?,
    )
}
