//! `infraguard config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use infraguard_core::error::{ConfigError, InfraguardError};
use infraguard_core::InfraguardConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// `config show`에서 고를 수 있는 섹션
pub const SECTIONS: &[&str] = &["general", "gcp", "tofu", "workspace", "timeouts"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// 실행에 쓸 설정을 로드합니다.
///
/// 파일이 없으면 기본값에 환경변수 오버라이드를 적용해 씁니다.
/// 두 번째 값은 파일에서 읽었는지 여부입니다.
pub async fn load_effective(config_path: &Path) -> Result<(InfraguardConfig, bool), CliError> {
    match InfraguardConfig::load(config_path).await {
        Ok(config) => Ok((config, true)),
        Err(InfraguardError::Config(ConfigError::FileNotFound { .. })) => {
            let mut config = InfraguardConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok((config, false))
        }
        Err(e) => Err(e.into()),
    }
}

/// Execute the config validate subcommand.
///
/// Unlike `run`, a missing file is reported as invalid here.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match InfraguardConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults).
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let (config, from_file) = load_effective(config_path).await?;
    let source = if from_file {
        config_path.display().to_string()
    } else {
        "built-in defaults".to_owned()
    };

    let report = build_report(&config, source, section)?;
    writer.render(&report)?;

    Ok(())
}

/// 전체 또는 한 섹션을 TOML로 직렬화한 리포트를 만듭니다.
pub fn build_report(
    config: &InfraguardConfig,
    source: String,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    let config_toml = match section.as_deref() {
        None => to_toml(config),
        Some("general") => to_toml(&config.general),
        Some("gcp") => to_toml(&config.gcp),
        Some("tofu") => to_toml(&config.tofu),
        Some("workspace") => to_toml(&config.workspace),
        Some("timeouts") => to_toml(&config.timeouts),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source,
        section,
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Configuration display report.
///
/// Contains the source file path and serialized TOML configuration.
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
///
/// Contains validation result and any error messages encountered.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
