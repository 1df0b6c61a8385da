//! text / JSON 출력
//!
//! 명령 핸들러는 [`OutputWriter::render`]만 호출하고 형식은 신경 쓰지 않습니다.
//! 로그는 stderr로 가므로 stdout에는 결과만 남습니다.

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// `--output` 플래그에 따라 결과를 stdout에 씁니다.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// ```no_run
    /// use infraguard_cli::cli::OutputFormat;
    /// use infraguard_cli::output::OutputWriter;
    ///
    /// let writer = OutputWriter::new(OutputFormat::Json);
    /// ```
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(&mut handle, payload)
    }

    /// 테스트에서 버퍼로 렌더링할 때 사용합니다. JSON은 pretty 형식에 개행으로 끝납니다.
    pub fn render_to<T: Render + Serialize>(
        &self,
        w: &mut dyn Write,
        payload: &T,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// 사람이 읽는 text 출력. 모든 결과 타입이 `Serialize`와 함께 구현합니다.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct CasePayload {
        name: String,
        minimum_secs: u64,
        reason: Option<String>,
    }

    impl Render for CasePayload {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Case: {}", self.name)?;
            writeln!(w, "Minimum: {}s", self.minimum_secs)?;
            Ok(())
        }
    }

    fn payload() -> CasePayload {
        CasePayload {
            name: "gke/plan_only".to_owned(),
            minimum_secs: 1800,
            reason: None,
        }
    }

    fn rendered(format: OutputFormat) -> String {
        let mut buffer = Vec::new();
        OutputWriter::new(format)
            .render_to(&mut buffer, &payload())
            .expect("rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_text_format_uses_render_impl() {
        let output = rendered(OutputFormat::Text);
        assert!(output.contains("Case: gke/plan_only"), "should render name");
        assert!(output.contains("Minimum: 1800s"), "should render minimum");
        assert!(!output.contains('{'), "text output must not be JSON");
    }

    #[test]
    fn test_json_format_is_pretty_and_parseable() {
        let output = rendered(OutputFormat::Json);
        assert!(output.contains('\n'), "pretty JSON should contain newlines");
        assert!(output.ends_with('\n'), "JSON output should end with newline");

        let parsed: serde_json::Value =
            serde_json::from_str(&output).expect("should parse back to JSON");
        assert_eq!(parsed["name"].as_str(), Some("gke/plan_only"));
        assert_eq!(parsed["minimum_secs"].as_u64(), Some(1800));
        assert!(parsed["reason"].is_null(), "None should be null in JSON");
    }

    #[test]
    fn test_writer_reports_format() {
        assert_eq!(
            OutputWriter::new(OutputFormat::Json).format(),
            OutputFormat::Json
        );
    }
}
