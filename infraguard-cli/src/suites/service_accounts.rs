//! 서비스 계정 모듈

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use infraguard_exec::CommandRunner;
use infraguard_harness::assert::{expect_eq, expect_not_empty};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, set_vars};

/// `service_accounts` 출력의 항목
#[derive(Debug, Deserialize)]
pub struct ServiceAccountInfo {
    pub email: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unique_id: String,
}

#[derive(Debug, Deserialize)]
struct DescribedAccount {
    #[serde(default)]
    disabled: bool,
}

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![case(
        "service_accounts",
        "create",
        TimeoutClass::Default,
        "prefixed account that exists and is enabled",
        |ctx, h| Box::pin(create(ctx, h)),
    )]
}

async fn create<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let prefix = format!("it-{}-", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "service_accounts").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "sa_prefix": prefix,
            "service_accounts": {
                "ci": { "description": "Integration CI SA", "disabled": false },
            },
            "prevent_destroy_service_accounts": false,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    let accounts: BTreeMap<String, ServiceAccountInfo> =
        tofu.output_json("service_accounts").await?;
    let ci = accounts.get("ci").ok_or_else(|| {
        HarnessError::Assertion("service_accounts: missing entry for ci".to_owned())
    })?;
    expect_not_empty("service_accounts.ci.email", &ci.email)?;

    let out = ctx
        .gcloud(&project)
        .run(&["iam", "service-accounts", "describe", &ci.email, "--format=json"])
        .await?;
    let described: DescribedAccount = serde_json::from_str(&out)?;
    expect_eq("disabled", "false", &described.disabled.to_string())
}
