//! `infraguard run` command handler

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use infraguard_core::{InfraguardConfig, Outcome, TestReport};
use infraguard_exec::{CommandRunner, ProcessRunner};
use infraguard_harness::timeout::{format_duration, parse_duration};
use infraguard_harness::{Deadline, Layout, TestScope, TestTimeout};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::suites::{self, Case, RunOptions, SuiteContext};

/// Execute the `run` command.
///
/// Cases run one at a time in catalogue order. Each case gets its own
/// [`TestScope`], so a failing case still tears down what it created
/// before the next one starts.
pub async fn execute(
    args: RunArgs,
    config: &InfraguardConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let cases = select(suites::catalogue::<ProcessRunner>(), &args)?;
    let timeout = resolve_timeout(args.timeout.as_deref(), config)?;
    let options = RunOptions {
        short: args.short,
        e2e: args.e2e,
    };

    let layout = Layout::from_config(&config.workspace)?;
    info!(
        root = %layout.root().display(),
        cases = cases.len(),
        timeout = %timeout,
        "running integration cases"
    );

    let ctx = Arc::new(SuiteContext::new(
        Arc::new(ProcessRunner::new()),
        config.clone(),
        layout,
        options,
    ));
    let summary = run_cases(ctx, &cases, timeout, config.timeouts.cleanup_reserve()).await;

    writer.render(&summary)?;

    if summary.failed > 0 {
        return Err(CliError::TestsFailed(summary.failed));
    }
    Ok(())
}

/// `--timeout`이 있으면 그 값을, 없으면 `timeouts.test_timeout_secs`를 씁니다.
pub fn resolve_timeout(
    flag: Option<&str>,
    config: &InfraguardConfig,
) -> Result<TestTimeout, CliError> {
    match flag {
        Some(raw) => Ok(TestTimeout::from_duration(parse_duration(raw)?)),
        None => Ok(TestTimeout::from_secs(config.timeouts.test_timeout_secs)),
    }
}

/// 인자로 실행할 케이스를 고릅니다.
///
/// - `--all`: 전체 카탈로그
/// - `--suite S`: 해당 스위트 전체 (케이스 이름과 함께 쓰면 그 스위트 안에서 고름)
/// - 케이스 이름: `suite/name` 또는 스위트 이름
pub fn select<R: CommandRunner>(
    catalogue: Vec<Case<R>>,
    args: &RunArgs,
) -> Result<Vec<Case<R>>, CliError> {
    if args.all {
        return Ok(catalogue);
    }
    if args.suite.is_none() && args.cases.is_empty() {
        return Err(CliError::Command(
            "no test cases selected (pass case names, --suite or --all)".to_owned(),
        ));
    }

    if let Some(suite) = &args.suite {
        if !catalogue.iter().any(|c| c.info.suite == suite.as_str()) {
            return Err(CliError::Command(format!("unknown suite: {suite}")));
        }
    }

    for wanted in &args.cases {
        let known = catalogue
            .iter()
            .any(|c| matches_selector(c, wanted, args.suite.as_deref()));
        if !known {
            return Err(CliError::Command(format!("unknown test case: {wanted}")));
        }
    }

    let selected: Vec<_> = catalogue
        .into_iter()
        .filter(|c| {
            let in_suite = args.suite.as_deref().is_none_or(|s| c.info.suite == s);
            let named = args.cases.is_empty()
                || args
                    .cases
                    .iter()
                    .any(|w| matches_selector(c, w, args.suite.as_deref()));
            in_suite && named
        })
        .collect();

    if selected.is_empty() {
        return Err(CliError::Command("selection matched no test cases".to_owned()));
    }
    Ok(selected)
}

fn matches_selector<R: CommandRunner>(case: &Case<R>, wanted: &str, suite: Option<&str>) -> bool {
    let info = &case.info;
    if wanted == info.id() || wanted == info.suite {
        return true;
    }
    // --suite와 함께 쓰면 케이스 이름만으로도 고를 수 있음
    suite.is_some_and(|s| s == info.suite && wanted == info.name)
}

/// 케이스를 순서대로 실행하고 결과를 모읍니다.
///
/// 제한 시간은 실행 전체에 걸립니다. 뒤쪽 케이스일수록 본문 예산이 줄어듭니다.
pub async fn run_cases<R: CommandRunner>(
    ctx: Arc<SuiteContext<R>>,
    cases: &[Case<R>],
    timeout: TestTimeout,
    cleanup_reserve: Duration,
) -> RunSummary {
    let mut reports = Vec::with_capacity(cases.len());
    let deadline = Deadline::start(timeout);

    for case in cases {
        let ctx = Arc::clone(&ctx);
        let report = TestScope::new(case.info.id())
            .timeout(timeout)
            .class(case.info.class)
            .cleanup_reserve(cleanup_reserve)
            .deadline(deadline)
            .run(|handle| case.invoke(ctx, handle))
            .await;

        for step in report.cleanup.orphan_suspects() {
            warn!(
                test = %report.name,
                label = %step.label,
                dir = step.dir.as_deref().unwrap_or("-"),
                "cleanup step did not succeed; resources may be orphaned"
            );
        }
        reports.push(report);
    }

    RunSummary::from_reports(reports)
}

/// `run` 결과 요약
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reports: Vec<TestReport>,
}

impl RunSummary {
    pub fn from_reports(reports: Vec<TestReport>) -> Self {
        let count = |outcome: Outcome| reports.iter().filter(|r| r.outcome == outcome).count();
        Self {
            passed: count(Outcome::Passed),
            failed: count(Outcome::Failed),
            skipped: count(Outcome::Skipped),
            reports,
        }
    }
}

impl Render for RunSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for report in &self.reports {
            let label = match report.outcome {
                Outcome::Passed => "PASS".green().bold(),
                Outcome::Failed => "FAIL".red().bold(),
                Outcome::Skipped => "SKIP".yellow().bold(),
            };
            writeln!(
                w,
                "{label} {} ({})",
                report.name,
                format_duration(report.duration())
            )?;
            if let Some(reason) = &report.reason {
                writeln!(w, "     {reason}")?;
            }
            for step in report.cleanup.orphan_suspects() {
                let dir = step.dir.as_deref().unwrap_or("-");
                writeln!(
                    w,
                    "     {} {} [{}] in {dir}",
                    "cleanup".red(),
                    step.label,
                    step.status.as_str()
                )?;
            }
        }

        writeln!(w)?;
        writeln!(
            w,
            "{} passed, {} failed, {} skipped",
            self.passed.to_string().green(),
            self.failed.to_string().red(),
            self.skipped.to_string().yellow()
        )?;
        Ok(())
    }
}
