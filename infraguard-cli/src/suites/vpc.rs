//! VPC 모듈 -- 커스텀 모드 네트워크, GKE용 보조 범위, 선택적 Cloud NAT

use std::sync::Arc;

use serde_json::json;

use infraguard_exec::CommandRunner;
use infraguard_harness::assert::{expect_empty, expect_eq, expect_gcloud_bool, expect_not_empty};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, set_vars};

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "vpc",
            "with_nat",
            TimeoutClass::Vpc,
            "network, subnet secondary ranges and Cloud NAT",
            |ctx, h| Box::pin(with_nat(ctx, h)),
        ),
        case(
            "vpc",
            "without_nat",
            TimeoutClass::Vpc,
            "network without router or NAT",
            |ctx, h| Box::pin(without_nat(ctx, h)),
        ),
    ]
}

async fn with_nat<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let region = ctx.region().to_owned();
    let vpc_name = format!("test-vpc-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "vpc").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "region": region,
            "vpc_name": vpc_name,
            "enable_cloud_nat": true,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    expect_eq("network_name", &vpc_name, &tofu.output("network_name").await?)?;
    let subnet_name = tofu.output("subnet_name").await?;
    expect_not_empty("subnet_name", &subnet_name)?;
    expect_eq("pods_range_name", "pods", &tofu.output("pods_range_name").await?)?;
    expect_eq(
        "services_range_name",
        "services",
        &tofu.output("services_range_name").await?,
    )?;

    let gcloud = ctx.gcloud(&project);
    let out = gcloud
        .run(&["compute", "networks", "describe", &vpc_name, "--format=value(name)"])
        .await?;
    expect_eq("network", &vpc_name, &out)?;

    let out = gcloud
        .run(&[
            "compute",
            "networks",
            "describe",
            &vpc_name,
            "--format=value(autoCreateSubnetworks)",
        ])
        .await?;
    expect_gcloud_bool("autoCreateSubnetworks", &out, false)?;

    let out = gcloud
        .run(&[
            "compute",
            "networks",
            "subnets",
            "describe",
            &subnet_name,
            "--region",
            &region,
            "--format=value(privateIpGoogleAccess)",
        ])
        .await?;
    expect_gcloud_bool("privateIpGoogleAccess", &out, true)?;

    let out = gcloud
        .run(&[
            "compute",
            "networks",
            "subnets",
            "describe",
            &subnet_name,
            "--region",
            &region,
            "--format=value(secondaryIpRanges[0].rangeName)",
        ])
        .await?;
    expect_eq("secondaryIpRanges[0]", "pods", &out)?;

    let nat_name = tofu.output("nat_name").await?;
    expect_not_empty("nat_name", &nat_name)?;
    let router = format!("{vpc_name}-router");
    let out = gcloud
        .run(&[
            "compute",
            "routers",
            "nats",
            "describe",
            &nat_name,
            "--router",
            &router,
            "--region",
            &region,
            "--format=value(name)",
        ])
        .await?;
    expect_eq("nat", &nat_name, &out)
}

async fn without_nat<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let vpc_name = format!("test-vpc-nonat-{}", ctx.unique_id());

    let tofu = ctx.stage_module(&handle, "vpc").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "region": ctx.region(),
            "vpc_name": vpc_name,
            "enable_cloud_nat": false,
        }),
    );
    handle.defer_destroy(&tofu);
    tofu.init_and_apply().await?;

    expect_eq("network_name", &vpc_name, &tofu.output("network_name").await?)?;
    expect_empty("nat_name", &tofu.output("nat_name").await?)?;
    expect_empty("router_name", &tofu.output("router_name").await?)
}
