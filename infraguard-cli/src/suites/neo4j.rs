//! Neo4j 전체 배포 end-to-end 테스트
//!
//! 인프라 레이어(VPC, GKE, 백업 SA, 백업 버킷)를 만든 뒤 앱 레이어
//! (`infra/apps/neo4j/test`)로 Neo4j를 배포하고, 클러스터 안에서 파드와
//! 서비스, NetworkPolicy를 확인합니다.
//!
//! teardown은 등록의 역순입니다: 앱, 버킷, SA, GKE, VPC.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{info, warn};

use infraguard_exec::{CommandRunner, Kubectl};
use infraguard_harness::assert::{expect_contains, expect_eq, expect_not_empty};
use infraguard_harness::timeout::format_duration;
use infraguard_harness::{HarnessError, ScopeHandle, TimeoutClass};

use super::{Case, SuiteContext, case, sa_email, set_vars};

/// 앱이 배포되는 네임스페이스
pub const NAMESPACE: &str = "neo4j";

/// 파드 준비 대기 한도
pub const READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// 파드 상태 폴링 간격
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(30);

const PHASE_JSONPATH: &str = "jsonpath={.status.phase}";
const READY_JSONPATH: &str = "jsonpath={.status.conditions[?(@.type=='Ready')].status}";

const DEFAULT_DENY_POLICY: &str = "default-deny-all";
const ALLOW_NEO4J_POLICY: &str = "allow-neo4j";

pub fn cases<R: CommandRunner>() -> Vec<Case<R>> {
    vec![
        case(
            "neo4j",
            "e2e",
            TimeoutClass::Neo4j,
            "infra layer plus Neo4j app layer, verified inside the cluster",
            |ctx, h| Box::pin(e2e(ctx, h)),
        )
        .e2e(),
    ]
}

async fn e2e<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    handle: ScopeHandle,
) -> Result<(), HarnessError> {
    let project = ctx.project()?;
    let region = ctx.region().to_owned();
    let suffix = ctx.unique_id();

    let vpc = ctx.stage_module(&handle, "vpc").await?;
    set_vars(
        &vpc,
        json!({
            "project_id": project,
            "region": region,
            "vpc_name": format!("neo4j-test-vpc-{suffix}"),
            "enable_cloud_nat": true,
        }),
    );

    // 네트워크 변수는 VPC apply 후에 채움
    let cluster_name = format!("neo4j-test-{suffix}");
    let gke = ctx.stage_module(&handle, "gke").await?;
    set_vars(
        &gke,
        json!({
            "project_id": project,
            "region": region,
            "cluster_name": cluster_name,
            "network_id": "",
            "subnet_id": "",
            "pods_range_name": "",
            "services_range_name": "",
            "deletion_protection": false,
            "enable_container_api": true,
        }),
    );

    let account_id = format!("neo4j-bk-{suffix}");
    let sa = ctx.stage_module(&handle, "service_accounts").await?;
    set_vars(
        &sa,
        json!({
            "project_id": project,
            "service_accounts": {
                account_id.as_str(): { "description": "Neo4j backup SA for integration test" },
            },
            "prevent_destroy_service_accounts": false,
        }),
    );

    let email = sa_email(&account_id, &project);
    let bucket_name = format!("{project}-neo4j-bkp-{suffix}");
    let bucket = ctx.stage_module(&handle, "backup_bucket").await?;
    set_vars(
        &bucket,
        json!({
            "project_id": project,
            "bucket_name": bucket_name,
            "location": region,
            "backup_sa_email": email,
            "enable_versioning": false,
            "force_destroy": true,
        }),
    );

    handle.defer_destroy_all(&[
        Arc::clone(&vpc),
        Arc::clone(&gke),
        Arc::clone(&sa),
        Arc::clone(&bucket),
    ]);

    handle.log("step 1: VPC");
    vpc.init_and_apply().await?;
    for key in ["network_id", "subnet_id", "pods_range_name", "services_range_name"] {
        gke.set_var(key, Value::String(vpc.output(key).await?));
    }

    handle.log("step 2: GKE cluster");
    gke.init_and_apply().await?;
    expect_not_empty("cluster_endpoint", &gke.output("cluster_endpoint").await?)?;
    let pool = gke.output("workload_identity_pool").await?;
    expect_eq("workload_identity_pool", &format!("{project}.svc.id.goog"), &pool)?;

    handle.log("step 3: backup service account");
    sa.init_and_apply().await?;

    handle.log("step 4: backup bucket");
    bucket.init_and_apply().await?;
    let bucket_url = bucket.output("bucket_url").await?;
    expect_eq("bucket_url", &format!("gs://{bucket_name}"), &bucket_url)?;

    handle.log("step 5: Neo4j app layer");
    let release = format!("neo4j-{suffix}");
    let app = ctx.stage_app(&handle, "neo4j/test").await?;
    set_vars(
        &app,
        json!({
            "project_id": project,
            "region": region,
            "cluster_name": cluster_name,
            "cluster_location": region,
            "workload_identity_pool": pool,
            "backup_gsa_email": email,
            "backup_gsa_name": format!("projects/{project}/serviceAccounts/{email}"),
            "backup_bucket_url": bucket_url,
            "neo4j_password": format!("test-pwd-{}", infraguard_harness::unique_id()),
            "neo4j_instance_name": release,
            "neo4j_namespace": NAMESPACE,
        }),
    );
    handle.defer_destroy(&app);
    app.init_and_apply().await?;

    expect_eq("namespace", NAMESPACE, &app.output("namespace").await?)?;
    expect_contains(
        "wi_binding_member",
        &app.output("wi_binding_member").await?,
        "neo4j-backup",
    )?;
    expect_eq(
        "network_policy_default_deny",
        DEFAULT_DENY_POLICY,
        &app.output("network_policy_default_deny").await?,
    )?;
    expect_eq(
        "network_policy_allow_neo4j",
        ALLOW_NEO4J_POLICY,
        &app.output("network_policy_allow_neo4j").await?,
    )?;

    handle.log("step 6: kubeconfig and pod readiness");
    let kube_dir = TempDir::new()?;
    let kubeconfig = kube_dir.path().join("kubeconfig");
    ctx.gcloud(&project)
        .with_env("KUBECONFIG", kubeconfig.to_string_lossy())
        .run_quiet(&[
            "container",
            "clusters",
            "get-credentials",
            &cluster_name,
            "--region",
            &region,
        ])
        .await?;
    let kubectl = ctx.kubectl(&kubeconfig).with_namespace(NAMESPACE);
    let pod = format!("{release}-0");
    wait_for_ready(&kubectl, &pod, READY_TIMEOUT, READY_POLL_INTERVAL).await?;

    handle.log("step 7: verify Neo4j");
    verify_running(&kubectl, &release).await
}

/// 파드가 `Running`이고 Ready 조건이 `True`가 될 때까지 기다립니다.
///
/// 조회 에러는 아직 준비되지 않은 것으로 취급합니다. 한도를 넘기면
/// `describe pod` 출력을 로그로 남기고 `Timeout` 에러를 반환합니다.
pub async fn wait_for_ready<R: CommandRunner>(
    kubectl: &Kubectl<R>,
    pod: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), HarnessError> {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        let phase = kubectl
            .run(&["get", "pod", pod, "-o", PHASE_JSONPATH])
            .await;
        if matches!(phase.as_deref(), Ok("Running")) {
            let ready = kubectl
                .run(&["get", "pod", pod, "-o", READY_JSONPATH])
                .await
                .unwrap_or_default();
            if ready == "True" {
                info!(pod, "pod is ready");
                return Ok(());
            }
        }
        tokio::time::sleep(interval).await;
        info!(pod, "waiting for pod to be ready");
    }

    match kubectl.run(&["describe", "pod", pod]).await {
        Ok(status) => warn!(pod, status = %status, "pod status on timeout"),
        Err(e) => warn!(pod, error = %e, "describe pod failed on timeout"),
    }
    Err(HarnessError::Timeout(format!(
        "pod {pod} not ready after {}",
        format_duration(timeout)
    )))
}

async fn verify_running<R: CommandRunner>(
    kubectl: &Kubectl<R>,
    release: &str,
) -> Result<(), HarnessError> {
    let pod = format!("{release}-0");

    let phase = kubectl
        .run(&["get", "pod", &pod, "-o", PHASE_JSONPATH])
        .await?;
    expect_eq("pod phase", "Running", &phase)?;

    let logs = kubectl.run(&["logs", &pod, "--tail=100"]).await?;
    expect_contains("pod logs", &logs.to_lowercase(), "started")?;

    // Helm 차트는 app.kubernetes.io/instance가 아니라 app 라벨을 씀
    let selector = format!("app={release}");
    let services = kubectl
        .run(&[
            "get",
            "svc",
            "-l",
            &selector,
            "-o",
            "jsonpath={.items[*].metadata.name}",
        ])
        .await?;
    expect_not_empty("services", &services)?;

    let policies = kubectl
        .run(&[
            "get",
            "networkpolicy",
            "-o",
            "jsonpath={.items[*].metadata.name}",
        ])
        .await?;
    expect_contains("networkpolicies", &policies, DEFAULT_DENY_POLICY)?;
    expect_contains("networkpolicies", &policies, ALLOW_NEO4J_POLICY)
}
