//! `infraguard list` command handler

use std::io::Write;

use serde::Serialize;

use infraguard_harness::timeout::format_duration;

use crate::cli::ListArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::suites::{self, CaseInfo};

/// Execute the `list` command.
pub fn execute(args: ListArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let report = build_catalogue(suites::case_infos(), args.suite.as_deref())?;
    writer.render(&report)
}

/// 카탈로그 항목을 출력용으로 변환합니다 (스위트 필터 적용).
pub fn build_catalogue(
    infos: Vec<CaseInfo>,
    suite: Option<&str>,
) -> Result<CatalogueReport, CliError> {
    let cases: Vec<CaseEntry> = infos
        .iter()
        .filter(|info| suite.is_none_or(|s| info.suite == s))
        .map(CaseEntry::from)
        .collect();

    if let (Some(suite), true) = (suite, cases.is_empty()) {
        return Err(CliError::Command(format!("unknown suite: {suite}")));
    }
    Ok(CatalogueReport { cases })
}

/// 카탈로그 항목 하나
#[derive(Debug, Serialize)]
pub struct CaseEntry {
    pub id: String,
    pub suite: String,
    pub name: String,
    /// 필요한 최소 제한 시간 (초)
    pub minimum_timeout_secs: u64,
    pub slow: bool,
    pub e2e: bool,
    pub description: String,
}

impl From<&CaseInfo> for CaseEntry {
    fn from(info: &CaseInfo) -> Self {
        Self {
            id: info.id(),
            suite: info.suite.to_owned(),
            name: info.name.to_owned(),
            minimum_timeout_secs: info.class.minimum().as_secs(),
            slow: info.slow.is_some(),
            e2e: info.e2e,
            description: info.description.to_owned(),
        }
    }
}

/// `list` 출력
#[derive(Debug, Serialize)]
pub struct CatalogueReport {
    pub cases: Vec<CaseEntry>,
}

impl Render for CatalogueReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{:<32} {:<9} {:<8} DESCRIPTION",
            "CASE".bold(),
            "MIN".bold(),
            "FLAGS".bold()
        )?;
        for case in &self.cases {
            let mut flags = Vec::new();
            if case.slow {
                flags.push("slow");
            }
            if case.e2e {
                flags.push("e2e");
            }
            writeln!(
                w,
                "{:<32} {:<9} {:<8} {}",
                case.id,
                format_duration(std::time::Duration::from_secs(case.minimum_timeout_secs)),
                flags.join(","),
                case.description
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{} case(s)", self.cases.len())?;
        Ok(())
    }
}
