//! 상태 버킷 bootstrap 스모크 테스트
//!
//! KMS 키링과 키는 삭제할 수 없으므로 adoption 계획으로 다룹니다.
//! 이미 있으면 import하고, 정리할 때는 destroy 대신 state에서 제거합니다.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use tempfile::TempDir;

use infraguard_exec::{CommandRunner, CommandSpec};
use infraguard_harness::assert::{expect_contains, expect_eq, expect_gcloud_bool};
use infraguard_harness::{HarnessError, KmsNames, ScopeHandle, TimeoutClass, kms_bootstrap_plan};

use super::{Case, SuiteContext, case, set_vars};

/// 키 회전 주기 (30일)
const ROTATION_PERIOD_SECS: u64 = 2_592_000;

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![case(
        "bootstrap",
        "smoke",
        TimeoutClass::Default,
        "CMEK state bucket with adopted KMS ring and key",
        |ctx, h| Box::pin(smoke(ctx, h)),
    )]
}

async fn smoke<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let location = ctx.state_bucket_location()?;
    let bucket = format!("{project}-state-{}", ctx.unique_id());
    let kms = KmsNames::for_project(&project, &location);

    let tofu = ctx.stage_module(&handle, "bootstrap").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "bucket_location": location,
            "bucket_name": bucket,
            "bucket_versioning": false,
            "kms_location": location,
            "kms_key_ring_name": kms.ring,
            "kms_key_name": kms.key,
            "rotation_period": format!("{ROTATION_PERIOD_SECS}s"),
            "force_destroy": true,
            "labels": { "component": "bootstrap", "test": "true" },
        }),
    );

    let gcloud = ctx.gcloud(&project);
    let plan = Arc::new(kms_bootstrap_plan(&project, &location, &bucket));
    plan.register_cleanup(&handle, &tofu, &gcloud);

    tofu.init().await?;
    let outcome = plan.adopt(&tofu, &gcloud).await?;
    handle.log(format!(
        "adopted {} existing KMS resource(s)",
        outcome.imported().count()
    ));
    tofu.apply().await?;

    let url = format!("gs://{bucket}");
    let describe = |format: &'static str| {
        let gcloud = gcloud.clone();
        let url = url.clone();
        async move {
            gcloud
                .run(&["storage", "buckets", "describe", &url, format])
                .await
        }
    };

    expect_contains("bucket", &describe("--format=value(name)").await?, &bucket)?;
    expect_gcloud_bool(
        "uniform_bucket_level_access",
        &describe("--format=value(uniform_bucket_level_access)").await?,
        true,
    )?;
    expect_eq(
        "public_access_prevention",
        "enforced",
        &describe("--format=value(public_access_prevention)")
            .await?
            .to_lowercase(),
    )?;
    expect_gcloud_bool(
        "versioning_enabled",
        &describe("--format=value(versioning_enabled)").await?,
        false,
    )?;
    expect_contains("state output", &tofu.output("state").await?, "kms_key_name")?;

    // 객체 쓰기/읽기
    let object = format!("{url}/it/{}.txt", nanos_since_epoch());
    let scratch = TempDir::new()?;
    let local = scratch.path().join("object.txt");
    tokio::fs::write(&local, "ok").await?;
    let local = local.to_string_lossy().into_owned();
    gcloud
        .run_quiet(&["storage", "cp", &local, &object, "--quiet"])
        .await?;
    expect_eq("object content", "ok", &gcloud.run(&["storage", "cat", &object]).await?)?;

    // 익명 읽기는 거부되어야 함
    let public_url = object.replacen("gs://", "https://storage.googleapis.com/", 1);
    let curl = ctx
        .runner()
        .run(&CommandSpec::new("curl").args(["-sSf", public_url.as_str()]))
        .await;
    if let Ok(out) = curl {
        if out.success() {
            return Err(HarnessError::Assertion(format!(
                "anonymous read of {public_url} succeeded"
            )));
        }
    }

    expect_eq(
        "default_kms_key",
        &format!("default_kms_key: {}", kms.key_id),
        &describe("--format=default(default_kms_key)").await?,
    )?;
    let out = gcloud
        .run(&[
            "storage",
            "objects",
            "describe",
            &object,
            "--format=default(kms_key)",
        ])
        .await?;
    expect_contains("object kms_key", &out, &format!("kms_key: {}", kms.key_id))?;

    gcloud
        .run_quiet(&["storage", "rm", "--quiet", &object])
        .await?;
    Ok(())
}

fn nanos_since_epoch() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
