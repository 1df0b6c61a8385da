//! GKE Autopilot 모듈

use std::sync::Arc;

use serde_json::json;

use infraguard_exec::CommandRunner;
use infraguard_harness::assert::{expect_contains, expect_eq, expect_gcloud_bool};
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, set_vars};

/// plan 출력에 반드시 포함되어야 하는 리소스 주소
pub const CLUSTER_ADDRESS: &str = "google_container_cluster.autopilot";

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "gke",
            "create",
            TimeoutClass::Gke,
            "VPC then an Autopilot cluster with private nodes",
            |ctx, h| Box::pin(create(ctx, h)),
        )
        .slow("Skipping GKE integration test in short mode (takes 10-15 minutes)"),
        case(
            "gke",
            "plan_only",
            TimeoutClass::Default,
            "init and plan against placeholder network ids",
            |ctx, h| Box::pin(plan_only(ctx, h)),
        ),
    ]
}

async fn create<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let region = ctx.region().to_owned();
    let suffix = ctx.unique_id();

    let vpc_name = format!("gke-test-vpc-{suffix}");
    let vpc = ctx.stage_module(&handle, "vpc").await?;
    set_vars(
        &vpc,
        json!({
            "project_id": project,
            "region": region,
            "vpc_name": vpc_name,
            "enable_cloud_nat": true,
        }),
    );
    handle.defer_destroy(&vpc);
    vpc.init_and_apply().await?;

    let network_id = vpc.output("network_id").await?;
    let subnet_id = vpc.output("subnet_id").await?;
    let pods_range = vpc.output("pods_range_name").await?;
    let services_range = vpc.output("services_range_name").await?;

    let cluster_name = format!("gke-test-{suffix}");
    let gke = ctx.stage_module(&handle, "gke").await?;
    set_vars(
        &gke,
        json!({
            "project_id": project,
            "region": region,
            "cluster_name": cluster_name,
            "network_id": network_id,
            "subnet_id": subnet_id,
            "pods_range_name": pods_range,
            "services_range_name": services_range,
            "deletion_protection": false,
            "enable_container_api": true,
        }),
    );
    handle.defer_destroy(&gke);
    gke.init_and_apply().await?;

    expect_eq("cluster_name", &cluster_name, &gke.output("cluster_name").await?)?;
    expect_eq(
        "workload_identity_pool",
        &format!("{project}.svc.id.goog"),
        &gke.output("workload_identity_pool").await?,
    )?;

    let gcloud = ctx.gcloud(&project);
    let describe = |format: &'static str| {
        let gcloud = gcloud.clone();
        let cluster_name = cluster_name.clone();
        let region = region.clone();
        async move {
            gcloud
                .run(&[
                    "container",
                    "clusters",
                    "describe",
                    &cluster_name,
                    "--region",
                    &region,
                    format,
                ])
                .await
        }
    };

    expect_eq("cluster", &cluster_name, &describe("--format=value(name)").await?)?;
    expect_gcloud_bool(
        "autopilot.enabled",
        &describe("--format=value(autopilot.enabled)").await?,
        true,
    )?;
    expect_gcloud_bool(
        "privateClusterConfig.enablePrivateNodes",
        &describe("--format=value(privateClusterConfig.enablePrivateNodes)").await?,
        true,
    )?;
    expect_gcloud_bool(
        "privateClusterConfig.enablePrivateEndpoint",
        &describe("--format=value(privateClusterConfig.enablePrivateEndpoint)").await?,
        false,
    )?;
    expect_eq(
        "releaseChannel.channel",
        "REGULAR",
        &describe("--format=value(releaseChannel.channel)").await?,
    )
}

async fn plan_only<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;

    // plan만 실행하므로 destroy는 등록하지 않음
    let tofu = ctx.stage_module(&handle, "gke").await?;
    set_vars(
        &tofu,
        json!({
            "project_id": project,
            "region": ctx.region(),
            "cluster_name": "plan-test-cluster",
            "network_id": "projects/test/global/networks/test-vpc",
            "subnet_id": "projects/test/regions/us-central1/subnetworks/test-subnet",
            "pods_range_name": "pods",
            "services_range_name": "services",
            "deletion_protection": false,
            "enable_container_api": false,
        }),
    );

    let plan = tofu.init_and_plan().await?;
    expect_contains("plan", &plan, CLUSTER_ADDRESS)
}
