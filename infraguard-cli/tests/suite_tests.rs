//! Suite integration tests.
//!
//! Runs catalogue cases end to end against a scripted command runner and a
//! throwaway repository layout, checking outcomes and cleanup ordering.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use infraguard_cli::commands::run::{RunSummary, run_cases};
use infraguard_cli::suites::{self, Case, CaseInfo, RunOptions, SuiteContext};
use infraguard_core::{CleanupStatus, InfraguardConfig, Outcome};
use infraguard_exec::{CommandSpec, MockResponse, MockRunner};
use infraguard_harness::{HarnessError, Layout, TestTimeout, TimeoutClass};

const MODULES: &[&str] = &[
    "vpc",
    "gke",
    "service_accounts",
    "backup_bucket",
    "secrets",
    "wif",
    "audit_logging",
    "bootstrap",
];

/// `.git`과 모듈 디렉토리를 가진 가짜 저장소
fn fixture_repo() -> TempDir {
    let repo = TempDir::new().expect("should create temp repo");
    fs::create_dir_all(repo.path().join(".git")).expect("git dir");
    for module in MODULES {
        let dir = repo.path().join("infra/modules").join(module);
        fs::create_dir_all(&dir).expect("module dir");
        fs::write(dir.join("main.tf"), "# module\n").expect("main.tf");
    }
    let app = repo.path().join("infra/apps/neo4j/test");
    fs::create_dir_all(&app).expect("app dir");
    fs::write(app.join("main.tf"), "# app\n").expect("app main.tf");
    repo
}

fn config(project: &str) -> InfraguardConfig {
    let mut config = InfraguardConfig::default();
    config.gcp.project_id = project.to_owned();
    config.gcp.state_bucket_location = "US".to_owned();
    config.tofu.retry_backoff_secs = 0;
    config
}

fn pick(id: &str) -> Vec<Case<MockRunner>> {
    suites::catalogue::<MockRunner>()
        .into_iter()
        .filter(|c| c.info.id() == id)
        .collect()
}

async fn run_one(
    runner: &Arc<MockRunner>,
    repo: &TempDir,
    config: InfraguardConfig,
    options: RunOptions,
    id: &str,
) -> RunSummary {
    let ctx = SuiteContext::new(
        Arc::clone(runner),
        config,
        Layout::new(repo.path()),
        options,
    )
    .with_fixed_id("abc123");
    let cases = pick(id);
    assert_eq!(cases.len(), 1, "{id} should be in the catalogue");
    run_cases(Arc::new(ctx), &cases, TestTimeout::Unlimited, Duration::from_secs(1)).await
}

fn ran_in(call: &CommandSpec, module: &str) -> bool {
    call.dir
        .as_deref()
        .is_some_and(|d| d.ends_with(Path::new("infra/modules").join(module)))
}

#[tokio::test]
async fn vpc_without_nat_passes_and_destroys_staged_copy() {
    // Given: NAT/router 출력이 비어 있는 VPC 모듈
    let repo = fixture_repo();
    let runner = Arc::new(
        MockRunner::new()
            .on(
                &["-json", "network_name"],
                MockResponse::ok("\"test-vpc-nonat-abc123\""),
            )
            .on(&["-json", "nat_name"], MockResponse::ok("null"))
            .on(&["-json", "router_name"], MockResponse::ok("\"\"")),
    );

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "vpc/without_nat",
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Passed, "reason: {:?}", report.reason);
    assert_eq!(summary.passed, 1);

    let calls = runner.calls();
    let apply = calls
        .iter()
        .find(|c| c.args.first().map(String::as_str) == Some("apply"))
        .expect("apply should run");
    assert!(ran_in(apply, "vpc"), "apply should run in the staged copy");
    assert_ne!(
        apply.dir.as_deref(),
        Some(repo.path().join("infra/modules/vpc").as_path()),
        "the source tree must never be applied directly"
    );
    assert_eq!(
        apply.env.get("GOOGLE_PROJECT").map(String::as_str),
        Some("acme-dev")
    );
    assert_eq!(runner.count_matching(&["destroy", "-input=false"]), 1);

    let labels: Vec<_> = report.cleanup.steps.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels.len(), 2, "destroy and staged removal: {labels:?}");
    assert_eq!(labels[1], "remove staged vpc", "staged dir goes last");
    let staged = apply.dir.as_deref().expect("staged dir");
    assert!(!staged.exists(), "staged copy should be removed after the test");
}

#[tokio::test]
async fn vpc_output_mismatch_fails_but_still_destroys() {
    // Given: 예상과 다른 네트워크 이름
    let repo = fixture_repo();
    let runner = Arc::new(
        MockRunner::new().on(&["-json", "network_name"], MockResponse::ok("\"other\"")),
    );

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "vpc/without_nat",
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Failed);
    let reason = report.reason.as_deref().unwrap_or_default();
    assert!(reason.contains("network_name"), "reason should name the output: {reason}");
    assert_eq!(
        runner.count_matching(&["destroy"]),
        1,
        "a failed assertion must not skip teardown"
    );
    assert!(report.cleanup.is_clean());
}

#[tokio::test]
async fn backup_bucket_failure_destroys_bucket_before_service_account() {
    // Given: SA apply는 성공, 버킷 모듈의 apply만 실패
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new().on_when(
        |spec| spec.args.first().map(String::as_str) == Some("apply") && ran_in(spec, "backup_bucket"),
        MockResponse::fail(1, "Error: googleapi: Error 403: permission denied"),
    ));

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "backup_bucket/create",
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Failed);
    assert!(
        report
            .reason
            .as_deref()
            .unwrap_or_default()
            .contains("permission denied"),
        "reason should carry the tofu error: {:?}",
        report.reason
    );

    let destroys: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|c| c.args.first().map(String::as_str) == Some("destroy"))
        .collect();
    assert_eq!(destroys.len(), 2, "both modules should be destroyed");
    assert!(ran_in(&destroys[0], "backup_bucket"), "bucket first");
    assert!(ran_in(&destroys[1], "service_accounts"), "service account last");
    assert_eq!(runner.count_matching(&["apply"]), 2, "SA applied, bucket attempted");
}

#[tokio::test]
async fn wif_precondition_passes_when_plan_is_rejected() {
    // Given: 셀렉터가 없어 plan이 precondition 에러로 실패
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new().on(
        &["plan"],
        MockResponse::fail(
            1,
            "Error: Resource precondition failed\n\nYou must specify at least one selector",
        ),
    ));

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "wif/precondition",
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Passed, "reason: {:?}", report.reason);
    assert_eq!(runner.count_matching(&["apply"]), 0, "nothing should be applied");
    assert_eq!(runner.count_matching(&["plan"]), 1, "non-transient errors are not retried");
}

#[tokio::test]
async fn wif_precondition_fails_when_plan_succeeds() {
    // Given: 모든 명령 성공
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new());

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "wif/precondition",
    )
    .await;

    // Then
    assert_eq!(summary.reports[0].outcome, Outcome::Failed);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn gke_create_is_skipped_in_short_mode() {
    // Given
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new());
    let options = RunOptions {
        short: true,
        e2e: false,
    };

    // When
    let summary = run_one(&runner, &repo, config("acme-dev"), options, "gke/create").await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Skipped);
    assert!(
        report.reason.as_deref().unwrap_or_default().contains("short mode"),
        "got: {:?}",
        report.reason
    );
    assert!(runner.calls().is_empty(), "skipped case must not run commands");
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn neo4j_is_skipped_without_e2e_flag() {
    // Given
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new());

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "neo4j/e2e",
    )
    .await;

    // Then
    assert_eq!(summary.reports[0].outcome, Outcome::Skipped);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn limited_timeout_below_class_minimum_skips() {
    // Given: GKE 케이스에 30분 미만의 제한 시간
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new());
    let ctx = SuiteContext::new(
        Arc::clone(&runner),
        config("acme-dev"),
        Layout::new(repo.path()),
        RunOptions::default(),
    );

    // When
    let summary = run_cases(
        Arc::new(ctx),
        &pick("gke/create"),
        TestTimeout::Limited(Duration::from_secs(10 * 60)),
        Duration::from_secs(60),
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Skipped);
    assert!(
        report.reason.as_deref().unwrap_or_default().contains("30m0s"),
        "reason should name the required minimum: {:?}",
        report.reason
    );
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn missing_project_fails_before_staging() {
    // Given: gcp.project_id 미설정
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new());

    // When
    let summary = run_one(
        &runner,
        &repo,
        config(""),
        RunOptions::default(),
        "vpc/without_nat",
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.reason.as_deref(),
        Some("missing required setting: gcp.project_id")
    );
    assert!(runner.calls().is_empty());
    assert!(report.cleanup.steps.is_empty(), "nothing was registered");
}

#[tokio::test]
async fn bootstrap_init_failure_still_runs_adoption_cleanup() {
    // Given: 백엔드 초기화 실패
    let repo = fixture_repo();
    let runner = Arc::new(
        MockRunner::new().on(&["init"], MockResponse::fail(1, "Error: backend error")),
    );

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "bootstrap/smoke",
    )
    .await;

    // Then: 테스트는 실패하지만 adoption cleanup은 모두 수행됨
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(runner.count_matching(&["apply"]), 0);
    assert_eq!(
        runner.count_matching(&["-target=google_storage_bucket.state_bucket"]),
        1,
        "ephemeral resources are destroyed by target"
    );
    assert_eq!(
        runner.count_matching(&["state", "rm", "google_kms_crypto_key.state_key"]),
        1
    );
    assert_eq!(
        runner.count_matching(&["state", "rm", "google_kms_key_ring.state_ring"]),
        1
    );
    assert_eq!(
        runner.count_matching(&["buckets", "delete", "gs://acme-dev-state-abc123"]),
        1
    );

    let adoption = report
        .cleanup
        .steps
        .iter()
        .find(|s| s.label == "adoption cleanup")
        .expect("adoption cleanup should be recorded");
    assert_eq!(adoption.status, CleanupStatus::Succeeded);
    assert_eq!(
        runner.count_matching(&["destroy"]),
        1,
        "only the targeted destroy runs; KMS resources never get a full destroy"
    );
}

#[tokio::test]
async fn bootstrap_requires_state_bucket_location() {
    // Given
    let repo = fixture_repo();
    let runner = Arc::new(MockRunner::new());
    let mut config = config("acme-dev");
    config.gcp.state_bucket_location = String::new();

    // When
    let summary = run_one(
        &runner,
        &repo,
        config,
        RunOptions::default(),
        "bootstrap/smoke",
    )
    .await;

    // Then
    assert_eq!(
        summary.reports[0].reason.as_deref(),
        Some("missing required setting: gcp.state_bucket_location")
    );
}

fn dir_ends_with(call: &CommandSpec, rel: &str) -> bool {
    call.dir.as_deref().is_some_and(|d| d.ends_with(rel))
}

fn position(lines: &[String], needle: &str) -> usize {
    lines
        .iter()
        .position(|l| l.contains(needle))
        .unwrap_or_else(|| panic!("no call containing '{needle}' in:\n{}", lines.join("\n")))
}

/// neo4j e2e가 통과하도록 출력과 클러스터 조회 결과를 채운 runner
fn neo4j_runner() -> MockRunner {
    let json = |s: &str| MockResponse::ok(format!("\"{s}\""));
    MockRunner::new()
        .on(&["-json", "cluster_endpoint"], json("10.0.0.2"))
        .on(
            &["-json", "workload_identity_pool"],
            json("acme-dev.svc.id.goog"),
        )
        .on(&["-json", "bucket_url"], json("gs://acme-dev-neo4j-bkp-abc123"))
        .on(&["-json", "namespace"], json("neo4j"))
        .on(
            &["-json", "wi_binding_member"],
            json("serviceAccount:acme-dev.svc.id.goog[neo4j/neo4j-backup]"),
        )
        .on(
            &["-json", "network_policy_default_deny"],
            json("default-deny-all"),
        )
        .on(&["-json", "network_policy_allow_neo4j"], json("allow-neo4j"))
        .on_when(
            |spec| spec.args.first().map(String::as_str) == Some("output"),
            json("projects/acme-dev/global/networks/neo4j-test-vpc-abc123"),
        )
        .on(&["jsonpath={.status.phase}"], MockResponse::ok("Running"))
        .on(
            &["jsonpath={.status.conditions[?(@.type=='Ready')].status}"],
            MockResponse::ok("True"),
        )
        .on(&["logs"], MockResponse::ok("2024-01-01 INFO Started."))
        .on(&["get", "svc"], MockResponse::ok("neo4j-abc123 neo4j-abc123-admin"))
        .on(
            &["get", "networkpolicy"],
            MockResponse::ok("default-deny-all allow-neo4j"),
        )
}

#[tokio::test]
async fn neo4j_e2e_tears_down_app_then_infra_in_reverse() {
    // Given: --e2e와 모든 조회가 성공하는 runner
    let repo = fixture_repo();
    let runner = Arc::new(neo4j_runner());
    let options = RunOptions {
        short: false,
        e2e: true,
    };

    // When
    let summary = run_one(&runner, &repo, config("acme-dev"), options, "neo4j/e2e").await;

    // Then: 앱이 먼저, 인프라는 등록의 역순으로 삭제됨
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Passed, "reason: {:?}", report.reason);

    let destroyed: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|c| c.args.first().map(String::as_str) == Some("destroy"))
        .collect();
    let order = [
        "infra/apps/neo4j/test",
        "infra/modules/backup_bucket",
        "infra/modules/service_accounts",
        "infra/modules/gke",
        "infra/modules/vpc",
    ];
    assert_eq!(destroyed.len(), order.len(), "every layer should be destroyed once");
    for (call, rel) in destroyed.iter().zip(order) {
        assert!(
            dir_ends_with(call, rel),
            "expected destroy in {rel}, got {:?}",
            call.dir
        );
    }

    assert_eq!(
        runner.count_matching(&["get-credentials", "neo4j-test-abc123"]),
        1,
        "kubeconfig should be fetched for the test cluster"
    );
}

#[tokio::test]
async fn bootstrap_adopts_existing_kms_and_untracks_it_on_cleanup() {
    // Given: 키링과 키가 이미 존재하고 버킷 검사가 모두 통과함
    let repo = fixture_repo();
    let key_id =
        "projects/acme-dev/locations/US/keyRings/acme-dev-tfstate-ring/cryptoKeys/tfstate-key";
    let runner = Arc::new(
        MockRunner::new()
            .on(&["kms", "keyrings", "describe"], MockResponse::ok("name: ring"))
            .on(&["kms", "keys", "describe"], MockResponse::ok("name: key"))
            .on(
                &["--format=value(name)"],
                MockResponse::ok("acme-dev-state-abc123"),
            )
            .on(
                &["--format=value(uniform_bucket_level_access)"],
                MockResponse::ok("True"),
            )
            .on(
                &["--format=value(public_access_prevention)"],
                MockResponse::ok("enforced"),
            )
            .on(&["--format=value(versioning_enabled)"], MockResponse::ok(""))
            .on(
                &["--format=default(default_kms_key)"],
                MockResponse::ok(format!("default_kms_key: {key_id}")),
            )
            .on(
                &["objects", "describe"],
                MockResponse::ok(format!("kms_key: {key_id}/cryptoKeyVersions/1")),
            )
            .on(
                &["-json", "state"],
                MockResponse::ok(format!(r#"{{"kms_key_name":"{key_id}"}}"#)),
            )
            .on(&["storage", "cat"], MockResponse::ok("ok"))
            .on(&["curl"], MockResponse::fail(22, "The requested URL returned error: 403")),
    );

    // When
    let summary = run_one(
        &runner,
        &repo,
        config("acme-dev"),
        RunOptions::default(),
        "bootstrap/smoke",
    )
    .await;

    // Then
    let report = &summary.reports[0];
    assert_eq!(report.outcome, Outcome::Passed, "reason: {:?}", report.reason);

    let lines = runner.call_lines();
    let steps = [
        "import -input=false",
        "google_kms_crypto_key.state_key projects/",
        "tofu apply",
        "-target=google_storage_bucket.state_bucket",
        "state rm google_kms_crypto_key.state_key",
        "state rm google_kms_key_ring.state_ring",
        "buckets delete gs://acme-dev-state-abc123",
    ];
    let positions: Vec<_> = steps.iter().map(|s| position(&lines, s)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "expected order {steps:?}, got positions {positions:?}"
    );
    assert!(
        lines[positions[0]].contains("google_kms_key_ring.state_ring"),
        "the ring is imported before the key: {}",
        lines[positions[0]]
    );
    assert_eq!(runner.count_matching(&["import"]), 2);
    assert_eq!(
        runner.count_matching(&["destroy"]),
        1,
        "only the targeted destroy runs"
    );
}

fn seven_minute_case(name: &'static str) -> Case<MockRunner> {
    Case {
        info: CaseInfo {
            suite: "timing",
            name,
            class: TimeoutClass::Default,
            slow: None,
            e2e: false,
            description: "sleeps for seven minutes",
        },
        run: |_ctx, _handle| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(7 * 60)).await;
                Ok::<(), HarnessError>(())
            })
        },
    }
}

#[tokio::test(start_paused = true)]
async fn run_timeout_covers_all_cases_together() {
    // Given: 10분 제한, 2분 예약, 각각 7분 걸리는 케이스 두 개
    let repo = fixture_repo();
    let ctx = SuiteContext::new(
        Arc::new(MockRunner::new()),
        config("acme-dev"),
        Layout::new(repo.path()),
        RunOptions::default(),
    );
    let cases = vec![seven_minute_case("first"), seven_minute_case("second")];
    let started = tokio::time::Instant::now();

    // When
    let summary = run_cases(
        Arc::new(ctx),
        &cases,
        TestTimeout::from_secs(600),
        Duration::from_secs(120),
    )
    .await;

    // Then: 두 번째 케이스는 남은 시간만 받아 중단됨
    let outcomes: Vec<_> = summary.reports.iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![Outcome::Passed, Outcome::Failed]);
    assert!(
        summary.reports[1]
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("exceeded its budget of 1m0s")),
        "got: {:?}",
        summary.reports[1].reason
    );
    assert!(
        started.elapsed() <= Duration::from_secs(600),
        "the run took {:?}, longer than its timeout",
        started.elapsed()
    );
}
