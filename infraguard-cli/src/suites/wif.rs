//! GitHub Actions용 Workload Identity Federation 모듈

use std::sync::Arc;

use serde_json::json;

use infraguard_exec::CommandRunner;
use infraguard_harness::assert::{expect_contains, expect_not_empty};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, set_vars};

/// GitHub OIDC 발급자
pub const GITHUB_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// 셀렉터가 하나도 없을 때 모듈 precondition이 내는 메시지
pub const NO_SELECTOR_MESSAGE: &str = "You must specify at least one selector";

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "wif",
            "create",
            TimeoutClass::Default,
            "pool and OIDC provider restricted to one repository and ref",
            |ctx, h| Box::pin(create(ctx, h)),
        ),
        case(
            "wif",
            "precondition",
            TimeoutClass::Default,
            "plan fails when no repository, ref or owner selector is given",
            |ctx, h| Box::pin(precondition(ctx, h)),
        ),
    ]
}

async fn create<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let pool_id = format!("gha-terratest-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "wif").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "pool_id": pool_id,
            "provider_id": "github",
            "issuer_uri": GITHUB_ISSUER,
            "allowed_repositories": ["acme/example"],
            "allowed_refs": ["refs/heads/main"],
            "prevent_destroy_pool": false,
            "prevent_destroy_provider": false,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    let provider = tofu.output("provider_name").await?;
    expect_not_empty("provider_name", &provider)?;

    let out = ctx
        .gcloud(&project)
        .run(&[
            "iam",
            "workload-identity-pools",
            "providers",
            "describe",
            &provider,
            "--format=value(oidc.issuerUri,attributeCondition)",
        ])
        .await?;

    let first_line = out.lines().next().unwrap_or_default();
    expect_contains("oidc.issuerUri", first_line, GITHUB_ISSUER)?;
    expect_contains(
        "attributeCondition",
        &out,
        r#"attribute.repository == "acme/example""#,
    )?;
    expect_contains(
        "attributeCondition",
        &out,
        r#"attribute.ref == "refs/heads/main""#,
    )
}

async fn precondition<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let pool_id = format!("gha-precond-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "wif").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "pool_id": pool_id,
            "provider_id": "github",
            "issuer_uri": GITHUB_ISSUER,
            "prevent_destroy_pool": false,
            "prevent_destroy_provider": false,
        }),
    );

    match tofu.init_and_plan().await {
        Ok(_) => Err(HarnessError::Assertion(
            "plan succeeded without any repository, ref or owner selector".to_owned(),
        )),
        Err(e) => expect_contains("plan error", &e.output_text(), NO_SELECTOR_MESSAGE),
    }
}
