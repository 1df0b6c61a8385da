//! Secret Manager 모듈

use std::sync::Arc;

use serde_json::json;

use infraguard_exec::{CommandRunner, Tofu};
use infraguard_harness::assert::{expect_contains, expect_eq};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, sa_email, set_vars};

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "secrets",
            "create",
            TimeoutClass::Default,
            "single labelled secret",
            |ctx, h| Box::pin(create(ctx, h)),
        ),
        case(
            "secrets",
            "with_accessors",
            TimeoutClass::Default,
            "secret accessor binding for a service account",
            |ctx, h| Box::pin(with_accessors(ctx, h)),
        ),
        case(
            "secrets",
            "multiple",
            TimeoutClass::Default,
            "two secrets in one module",
            |ctx, h| Box::pin(multiple(ctx, h)),
        ),
    ]
}

async fn create<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let name = format!("test-secret-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "secrets").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "secrets": {
                name.as_str(): {
                    "description": "Integration test secret",
                    "labels": { "test": "true" },
                },
            },
            "enable_secret_manager_api": true,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    let ids = tofu.output_map("secret_ids").await?;
    let id = ids
        .get(&name)
        .ok_or_else(|| HarnessError::Assertion(format!("secret_ids: missing entry for {name}")))?;
    expect_contains("secret_ids", id, &name)?;

    let gcloud = ctx.gcloud(&project);
    let out = gcloud
        .run(&["secrets", "describe", &name, "--format=value(name)"])
        .await?;
    expect_contains("secret", &out, &name)?;
    let out = gcloud
        .run(&["secrets", "describe", &name, "--format=value(labels.test)"])
        .await?;
    expect_eq("labels.test", "true", &out)
}

async fn with_accessors<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let account_id = format!("test-sa-{}", ctx.unique_id());
    let email = sa_email(&account_id, &project);
    let name = format!("test-secret-acl-{}", ctx.unique_id());

    let sa = ctx.stage_module(&handle, "service_accounts").await?;
    set_vars(
        &sa,
        json!({
            "project_id": project,
            "service_accounts": { account_id.as_str(): { "description": "Secret accessor SA" } },
            "prevent_destroy_service_accounts": false,
        }),
    );

    let secrets = ctx.stage_module(&handle, "secrets").await?;
    set_vars(
        &secrets,
        json!({
            "project_id": project,
            "secrets": { name.as_str(): { "description": "Secret with accessors" } },
            "accessors": { name.as_str(): [] },
            "enable_secret_manager_api": false,
        }),
    );

    handle.defer_destroy(&sa);
    handle.defer_destroy(&secrets);

    sa.init_and_apply().await?;
    // 서비스 계정이 생긴 뒤에야 멤버로 지정할 수 있음
    secrets.set_var(
        "accessors",
        json!({ name.as_str(): [format!("serviceAccount:{email}")] }),
    );
    secrets.init_and_apply().await?;

    expect_secret_ids(&secrets, &[&name]).await?;

    let policy = ctx
        .gcloud(&project)
        .run(&["secrets", "get-iam-policy", &name, "--format=json"])
        .await?;
    expect_contains("iam policy", &policy, &email)?;
    expect_contains("iam policy", &policy, "roles/secretmanager.secretAccessor")
}

async fn multiple<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let suffix = ctx.unique_id();
    let first = format!("secret-one-{suffix}");
    let second = format!("secret-two-{suffix}");

    let tofu = ctx.stage_module(&handle, "secrets").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "secrets": {
                first.as_str(): { "description": "First secret" },
                second.as_str(): {
                    "description": "Second secret",
                    "labels": { "priority": "high" },
                },
            },
            "enable_secret_manager_api": false,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    let count = expect_secret_ids(&tofu, &[&first, &second]).await?;
    expect_eq("secret_ids count", "2", &count.to_string())
}

/// `secret_ids` 출력에 모든 이름이 있는지 확인하고 항목 수를 반환합니다.
async fn expect_secret_ids<R: CommandRunner>(
    tofu: &Tofu<R>,
    names: &[&str],
) -> Result<usize, HarnessError> {
    let ids = tofu.output_map("secret_ids").await?;
    for name in names {
        if !ids.contains_key(*name) {
            return Err(HarnessError::Assertion(format!(
                "secret_ids: missing entry for {name}"
            )));
        }
    }
    Ok(ids.len())
}
