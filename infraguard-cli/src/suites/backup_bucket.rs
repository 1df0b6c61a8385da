//! 백업 버킷 모듈 (버킷 + 백업 서비스 계정 IAM)

use std::sync::Arc;

use serde_json::json;

use infraguard_exec::{CommandRunner, Gcloud};
use infraguard_harness::assert::{expect_contains, expect_eq, expect_gcloud_bool};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, sa_email, set_vars};

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "backup_bucket",
            "create",
            TimeoutClass::Default,
            "hardened bucket with versioning and writer/reader IAM for the backup SA",
            |ctx, h| Box::pin(create(ctx, h)),
        ),
        case(
            "backup_bucket",
            "without_versioning",
            TimeoutClass::Default,
            "hardened bucket with versioning disabled",
            |ctx, h| Box::pin(without_versioning(ctx, h)),
        ),
    ]
}

async fn create<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let suffix = ctx.unique_id();
    let account_id = format!("backup-{suffix}");
    let email = sa_email(&account_id, &project);
    let bucket_name = format!("{project}-backup-test-{suffix}");

    let sa = ctx.stage_module(&handle, "service_accounts").await?;
    set_vars(
        &sa,
        json!({
            "project_id": project,
            "service_accounts": { account_id.as_str(): { "description": "Test backup SA" } },
            "prevent_destroy_service_accounts": false,
        }),
    );

    let bucket = ctx.stage_module(&handle, "backup_bucket").await?;
    set_vars(
        &bucket,
        json!({
            "project_id": project,
            "bucket_name": bucket_name,
            "location": ctx.region(),
            "backup_sa_email": email,
            "backup_retention_days": 30,
            "backup_versions_to_keep": 5,
            "force_destroy": true,
            "labels": { "test": "true" },
        }),
    );

    // LIFO: 버킷이 먼저 삭제되고 서비스 계정이 나중에 삭제됨
    handle.defer_destroy(&sa);
    handle.defer_destroy(&bucket);

    sa.init_and_apply().await?;
    bucket.init_and_apply().await?;

    expect_eq("bucket_name", &bucket_name, &bucket.output("bucket_name").await?)?;
    expect_eq(
        "bucket_url",
        &format!("gs://{bucket_name}"),
        &bucket.output("bucket_url").await?,
    )?;

    let gcloud = ctx.gcloud(&project);
    let out = describe(&gcloud, &bucket_name, "value(name)").await?;
    expect_contains("bucket", &out, &bucket_name)?;
    verify_hardening(&gcloud, &bucket_name).await?;
    let out = describe(&gcloud, &bucket_name, "value(versioning_enabled)").await?;
    expect_gcloud_bool("versioning_enabled", &out, true)?;

    let url = format!("gs://{bucket_name}");
    let policy = gcloud
        .run(&["storage", "buckets", "get-iam-policy", &url, "--format=json"])
        .await?;
    expect_contains("iam policy", &policy, &email)?;
    expect_contains("iam policy", &policy, "roles/storage.objectCreator")?;
    expect_contains("iam policy", &policy, "roles/storage.objectViewer")
}

async fn without_versioning<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let suffix = ctx.unique_id();
    let account_id = format!("bkp-{suffix}");
    let bucket_name = format!("{project}-novers-{suffix}");

    let sa = ctx.stage_module(&handle, "service_accounts").await?;
    set_vars(
        &sa,
        json!({
            "project_id": project,
            "service_accounts": { account_id.as_str(): { "description": "Test backup SA" } },
            "prevent_destroy_service_accounts": false,
        }),
    );

    let bucket = ctx.stage_module(&handle, "backup_bucket").await?;
    set_vars(
        &bucket,
        json!({
            "project_id": project,
            "bucket_name": bucket_name,
            "location": ctx.region(),
            "backup_sa_email": sa_email(&account_id, &project),
            "enable_versioning": false,
            "force_destroy": true,
        }),
    );

    handle.defer_destroy(&sa);
    handle.defer_destroy(&bucket);

    sa.init_and_apply().await?;
    bucket.init_and_apply().await?;

    let gcloud = ctx.gcloud(&project);
    let out = describe(&gcloud, &bucket_name, "value(versioning_enabled)").await?;
    expect_gcloud_bool("versioning_enabled", &out, false)?;
    verify_hardening(&gcloud, &bucket_name).await
}

async fn describe<R: CommandRunner>(
    gcloud: &Gcloud<R>,
    bucket: &str,
    format: &str,
) -> Result<String, HarnessError> {
    let url = format!("gs://{bucket}");
    let format = format!("--format={format}");
    Ok(gcloud
        .run(&["storage", "buckets", "describe", &url, &format])
        .await?)
}

/// 균일 접근과 공개 접근 차단
async fn verify_hardening<R: CommandRunner>(
    gcloud: &Gcloud<R>,
    bucket: &str,
) -> Result<(), HarnessError> {
    let out = describe(gcloud, bucket, "value(uniform_bucket_level_access)").await?;
    expect_gcloud_bool("uniform_bucket_level_access", &out, true)?;
    let out = describe(gcloud, bucket, "value(public_access_prevention)").await?;
    expect_eq("public_access_prevention", "enforced", &out.to_lowercase())
}
