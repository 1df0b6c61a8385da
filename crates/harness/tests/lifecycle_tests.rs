//! Lifecycle integration tests.
//!
//! Tests the full flow: timeout gate -> body -> LIFO cleanup, and the KMS
//! adoption workflow, against a scripted command runner.

use std::sync::Arc;
use std::time::Duration;

use infraguard_core::{CleanupStatus, Outcome};
use infraguard_exec::{Gcloud, MockResponse, MockRunner, Tofu};
use infraguard_harness::adoption::{STATE_KEY_ADDRESS, STATE_RING_ADDRESS};
use infraguard_harness::workspace::REPO_ROOT_ENV;
use infraguard_harness::{
    Deadline, HarnessError, TestScope, TestTimeout, TimeoutClass, kms_bootstrap_plan, repo_root,
};
use serial_test::serial;
use tempfile::TempDir;

fn module_dirs(n: usize) -> Vec<TempDir> {
    (0..n).map(|_| TempDir::new().expect("temp dir")).collect()
}

/// destroy 호출이 일어난 디렉토리 순서
fn destroy_order(runner: &MockRunner, dirs: &[TempDir]) -> Vec<usize> {
    runner
        .calls()
        .iter()
        .filter(|c| c.args.first().map(String::as_str) == Some("destroy"))
        .filter_map(|c| {
            let dir = c.dir.as_deref()?;
            dirs.iter().position(|d| d.path() == dir)
        })
        .collect()
}

#[tokio::test]
async fn modules_are_destroyed_in_reverse_order_after_failure() {
    // Given: VPC, GKE, SA, bucket modules registered in dependency order
    let runner = Arc::new(MockRunner::new().on(
        &["apply"],
        MockResponse::fail(1, "Error: googleapi: Error 400: invalid value"),
    ));
    let dirs = module_dirs(4);
    let modules: Vec<_> = dirs
        .iter()
        .map(|d| Arc::new(Tofu::new(Arc::clone(&runner), d.path())))
        .collect();

    // When: the body fails on the first apply
    let body_modules = modules.clone();
    let report = TestScope::new("neo4j/e2e")
        .run(move |handle| async move {
            handle.defer_destroy_all(&body_modules);
            body_modules[0].init_and_apply().await?;
            Ok::<(), HarnessError>(())
        })
        .await;

    // Then: the test fails but every module is destroyed, last registered first
    assert_eq!(report.outcome, Outcome::Failed);
    assert!(
        report.reason.as_deref().is_some_and(|r| r.contains("invalid value")),
        "failure reason should carry tofu stderr: {:?}",
        report.reason
    );
    assert_eq!(destroy_order(&runner, &dirs), vec![3, 2, 1, 0]);
    assert!(report.cleanup.is_clean());
}

#[tokio::test]
async fn panicking_cleanup_is_isolated_and_test_still_passes() {
    // Given: the middle module's destroy panics
    let dirs = module_dirs(3);
    let middle = dirs[1].path().display().to_string();
    let runner = Arc::new(MockRunner::new());
    let panicking = Arc::new(
        MockRunner::new().on(&["destroy"], MockResponse::panic("provider crashed")),
    );
    let first = Arc::new(Tofu::new(Arc::clone(&runner), dirs[0].path()));
    let second = Arc::new(Tofu::new(panicking, dirs[1].path()));
    let third = Arc::new(Tofu::new(Arc::clone(&runner), dirs[2].path()));

    // When
    let report = TestScope::new("backup_bucket/create")
        .run(move |handle| async move {
            handle.defer_destroy(&first);
            handle.defer_destroy(&second);
            handle.defer_destroy(&third);
            Ok(())
        })
        .await;

    // Then: cleanup failure never fails a passing test
    assert_eq!(report.outcome, Outcome::Passed);
    assert_eq!(destroy_order(&runner, &dirs), vec![2, 0]);
    let suspects: Vec<_> = report.cleanup.orphan_suspects().collect();
    assert_eq!(suspects.len(), 1);
    assert_eq!(suspects[0].dir.as_deref(), Some(middle.as_str()));
    assert!(matches!(
        &suspects[0].status,
        CleanupStatus::Panicked { message } if message == "provider crashed"
    ));
}

#[tokio::test]
async fn panicking_body_fails_and_still_cleans_up() {
    let dirs = module_dirs(1);
    let runner = Arc::new(
        MockRunner::new().on(&["apply"], MockResponse::panic("unexpected output shape")),
    );
    let tofu = Arc::new(Tofu::new(Arc::clone(&runner), dirs[0].path()));

    let report = TestScope::new("vpc/with_nat")
        .run(move |handle| async move {
            handle.defer_destroy(&tofu);
            tofu.apply().await?;
            Ok::<(), HarnessError>(())
        })
        .await;

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.reason.as_deref(),
        Some("panicked: unexpected output shape")
    );
    assert_eq!(runner.count_matching(&["destroy"]), 1);
}

#[tokio::test(start_paused = true)]
async fn body_exceeding_budget_is_aborted_before_cleanup() {
    // Given: a 10m timeout with a 2m reserve, and an apply that hangs for an hour
    let dirs = module_dirs(1);
    let runner = Arc::new(MockRunner::new().on(
        &["apply"],
        MockResponse::ok("").delayed(Duration::from_secs(3600)),
    ));
    let tofu = Arc::new(Tofu::new(Arc::clone(&runner), dirs[0].path()));

    // When
    let report = TestScope::new("gke/plan_only")
        .timeout(TestTimeout::from_secs(600))
        .cleanup_reserve(Duration::from_secs(120))
        .run(move |handle| async move {
            handle.defer_destroy(&tofu);
            tofu.apply().await?;
            Ok::<(), HarnessError>(())
        })
        .await;

    // Then: the body is cut at 8m and destroy still runs
    assert_eq!(report.outcome, Outcome::Failed);
    assert!(
        report
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("exceeded its budget of 8m0s")),
        "unexpected reason: {:?}",
        report.reason
    );
    assert_eq!(runner.count_matching(&["destroy"]), 1);
    assert!(report.duration() < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn shared_deadline_bounds_the_whole_run() {
    // Given: one 10m run deadline with a 2m reserve, and bodies that each take 7m
    let deadline = Deadline::start(TestTimeout::from_secs(600));
    let started = tokio::time::Instant::now();
    let scope = |name: &str| {
        TestScope::new(name)
            .timeout(TestTimeout::from_secs(600))
            .cleanup_reserve(Duration::from_secs(120))
            .deadline(deadline)
    };
    let seven_minutes = |_handle| async {
        tokio::time::sleep(Duration::from_secs(7 * 60)).await;
        Ok::<(), HarnessError>(())
    };

    // When: three scopes run one after another
    let first = scope("secrets/create").run(seven_minutes).await;
    let second = scope("secrets/multiple").run(seven_minutes).await;
    let third = scope("wif/create").run(seven_minutes).await;

    // Then: only the first fits; the second gets what is left; the third fails fast
    assert_eq!(first.outcome, Outcome::Passed);
    assert_eq!(second.outcome, Outcome::Failed);
    assert!(
        second
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("exceeded its budget of 1m0s")),
        "second body should get the remaining 3m minus the reserve: {:?}",
        second.reason
    );
    assert_eq!(third.outcome, Outcome::Failed);
    assert!(
        third
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("leaves no time")),
        "third scope should not start a body: {:?}",
        third.reason
    );
    assert!(
        started.elapsed() <= Duration::from_secs(600),
        "the run must not outlive its timeout, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn skipped_test_provisions_nothing() {
    let runner = Arc::new(MockRunner::new());
    let body_runner = Arc::clone(&runner);

    let report = TestScope::new("neo4j/e2e")
        .timeout(TestTimeout::from_secs(1800))
        .class(TimeoutClass::Neo4j)
        .run(move |_handle| async move {
            let dir = TempDir::new()?;
            Tofu::new(body_runner, dir.path()).init().await?;
            Ok::<(), HarnessError>(())
        })
        .await;

    assert_eq!(report.outcome, Outcome::Skipped);
    assert_eq!(
        report.reason.as_deref(),
        Some(
            "test timeout (30m0s) is less than minimum required (45m0s). Run with --timeout=45m0s or higher."
        )
    );
    assert!(runner.calls().is_empty(), "no command may run for a skipped test");
    assert!(report.cleanup.steps.is_empty());
}

#[tokio::test]
async fn adoption_imports_only_existing_resources() {
    // Given: the keyring exists but the key does not
    let dir = TempDir::new().expect("temp dir");
    let runner = Arc::new(
        MockRunner::new()
            .on(&["kms", "keyrings", "describe"], MockResponse::ok("name: ring"))
            .on(&["kms", "keys", "describe"], MockResponse::fail(1, "NOT_FOUND")),
    );
    let tofu = Tofu::new(Arc::clone(&runner), dir.path());
    let gcloud = Gcloud::new(Arc::clone(&runner), "acme-dev");
    let plan = kms_bootstrap_plan("acme-dev", "us-central1", "acme-dev-state-abc123");

    // When
    let outcome = plan.adopt(&tofu, &gcloud).await.expect("adopt should succeed");

    // Then
    assert!(outcome.was_imported(STATE_RING_ADDRESS));
    assert!(!outcome.was_imported(STATE_KEY_ADDRESS));
    assert_eq!(runner.count_matching(&["import"]), 1);
    let import = runner
        .calls()
        .into_iter()
        .find(|c| c.args.first().map(String::as_str) == Some("import"))
        .expect("import call recorded");
    assert!(import.args.ends_with(&[
        STATE_RING_ADDRESS.to_owned(),
        "projects/acme-dev/locations/us-central1/keyRings/acme-dev-tfstate-ring".to_owned(),
    ]));
}

#[tokio::test]
async fn adoption_import_failure_is_returned() {
    let dir = TempDir::new().expect("temp dir");
    let runner = Arc::new(
        MockRunner::new()
            .on(&["import"], MockResponse::fail(1, "Error: Cannot import non-existent remote object")),
    );
    let tofu = Tofu::new(Arc::clone(&runner), dir.path());
    let gcloud = Gcloud::new(Arc::clone(&runner), "acme-dev");
    let plan = kms_bootstrap_plan("acme-dev", "us-central1", "b");

    let err = plan.adopt(&tofu, &gcloud).await.expect_err("import error must surface");

    assert!(matches!(err, HarnessError::Exec(_)));
}

#[tokio::test]
async fn adoption_cleanup_runs_in_order_and_ignores_errors() {
    // Given: every cleanup step fails
    let dir = TempDir::new().expect("temp dir");
    let runner = Arc::new(
        MockRunner::new()
            .on(&["destroy"], MockResponse::fail(1, "Error: bucket not empty"))
            .on(&["state", "rm"], MockResponse::fail(1, "No matching objects found"))
            .on(&["buckets", "delete"], MockResponse::fail(1, "NotFoundException: 404")),
    );
    let tofu = Arc::new(Tofu::new(Arc::clone(&runner), dir.path()));
    let gcloud = Gcloud::new(Arc::clone(&runner), "acme-dev");
    let plan = Arc::new(kms_bootstrap_plan("acme-dev", "us-central1", "acme-dev-state-abc123"));

    // When: registered before anything else, then run by the scope
    let report = TestScope::new("bootstrap/smoke")
        .run({
            let plan = Arc::clone(&plan);
            let tofu = Arc::clone(&tofu);
            move |handle| async move {
                plan.register_cleanup(&handle, &tofu, &gcloud);
                Ok(())
            }
        })
        .await;

    // Then: targeted destroy -> state rm key -> state rm ring -> bucket delete
    assert_eq!(report.outcome, Outcome::Passed);
    assert!(report.cleanup.is_clean(), "adoption cleanup never reports an error");
    let lines = runner.call_lines();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("destroy"));
    assert!(lines[0].contains("-target=google_storage_bucket_iam_member.extra"));
    assert!(lines[0].contains("-target=google_kms_crypto_key_iam_member.extra"));
    assert!(lines[0].contains("-target=google_storage_bucket.state_bucket"));
    assert_eq!(lines[1], format!("tofu state rm {STATE_KEY_ADDRESS}"));
    assert_eq!(lines[2], format!("tofu state rm {STATE_RING_ADDRESS}"));
    assert_eq!(
        lines[3],
        "gcloud --project acme-dev storage buckets delete gs://acme-dev-state-abc123 --quiet"
    );
}

#[tokio::test]
async fn adoption_cleanup_returns_ignored_errors() {
    let dir = TempDir::new().expect("temp dir");
    let runner = Arc::new(MockRunner::new().on(&["state", "rm"], MockResponse::fail(1, "locked")));
    let tofu = Tofu::new(Arc::clone(&runner), dir.path());
    let gcloud = Gcloud::new(Arc::clone(&runner), "p");
    let plan = kms_bootstrap_plan("p", "us", "b");

    let ignored = plan.cleanup(&tofu, &gcloud).await;

    assert_eq!(ignored.len(), 2);
    assert!(ignored[0].starts_with(&format!("state rm {STATE_KEY_ADDRESS}")));
}

#[test]
#[serial]
fn repo_root_falls_back_to_env() {
    // SAFETY: serial test, no other thread reads the environment
    unsafe { std::env::set_var(REPO_ROOT_ENV, "/opt/infra-repo") };
    let root = repo_root("");
    unsafe { std::env::remove_var(REPO_ROOT_ENV) };

    assert_eq!(
        root.expect("env root should be used"),
        std::path::PathBuf::from("/opt/infra-repo")
    );
}
