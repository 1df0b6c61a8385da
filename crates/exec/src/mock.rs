//! 테스트용 스크립트 기반 CommandRunner
//!
//! 실제 tofu / gcloud 없이 하네스 동작을 검증하기 위한 mock입니다.
//! 모든 호출을 기록하고, 인자 패턴별로 미리 정한 응답을 돌려줍니다.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ExecError;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// mock 응답 한 건
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 프로세스가 정상적으로 종료됨 (종료 코드는 임의)
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// 실행 중 panic
    Panic(String),
    /// 프로세스 시작 실패
    SpawnError(String),
    /// 응답 전 지연 (시간 초과 시뮬레이션용)
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// 종료 코드 0, 주어진 stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// 주어진 종료 코드와 stderr
    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::Panic(message.into())
    }

    pub fn spawn_error(reason: impl Into<String>) -> Self {
        Self::SpawnError(reason.into())
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delay(delay, Box::new(self))
    }
}

/// 호출 일치 조건
enum Matcher {
    /// `program args...` 안의 연속된 토큰열 (비어 있으면 모든 호출)
    Tokens(Vec<String>),
    Predicate(Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>),
}

impl Matcher {
    fn tokens(pattern: &[&str]) -> Self {
        Self::Tokens(pattern.iter().map(|s| (*s).to_owned()).collect())
    }

    fn matches(&self, spec: &CommandSpec) -> bool {
        match self {
            Self::Tokens(pattern) => {
                let mut line = Vec::with_capacity(spec.args.len() + 1);
                line.push(spec.program.as_str());
                line.extend(spec.args.iter().map(String::as_str));
                pattern.is_empty()
                    || line
                        .windows(pattern.len())
                        .any(|w| w.iter().zip(pattern).all(|(a, b)| *a == b.as_str()))
            }
            Self::Predicate(predicate) => predicate(spec),
        }
    }
}

struct Rule {
    matcher: Matcher,
    /// 순서대로 소비되며 마지막 응답은 계속 재사용됨
    responses: VecDeque<MockResponse>,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        self.matcher.matches(spec)
    }

    fn next_response(&mut self) -> MockResponse {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap_or_else(|| MockResponse::ok(""))
        } else {
            self.responses
                .front()
                .cloned()
                .unwrap_or_else(|| MockResponse::ok(""))
        }
    }
}

/// 스크립트 기반 mock runner
///
/// 규칙은 등록 순서대로 검사하며 처음 일치한 규칙의 응답을 사용합니다.
/// 패턴은 `program args...` 안에서 연속된 토큰열로 일치 여부를 판단합니다.
/// 일치하는 규칙이 없으면 종료 코드 0, 빈 출력을 반환합니다.
#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl MockRunner {
    /// 모든 명령이 성공하는 mock runner를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 패턴에 일치하는 모든 호출에 같은 응답을 반환합니다.
    pub fn on(self, pattern: &[&str], response: MockResponse) -> Self {
        self.on_sequence(pattern, vec![response])
    }

    /// 패턴에 일치하는 호출마다 응답을 순서대로 반환합니다 (마지막 응답은 반복).
    pub fn on_sequence(self, pattern: &[&str], responses: Vec<MockResponse>) -> Self {
        self.push_rule(Matcher::tokens(pattern), responses)
    }

    /// 토큰열로 표현하기 어려운 조건 (작업 디렉토리, 환경변수 등)
    pub fn on_when<F>(self, predicate: F, response: MockResponse) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.push_rule(Matcher::Predicate(Box::new(predicate)), vec![response])
    }

    fn push_rule(self, matcher: Matcher, responses: Vec<MockResponse>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                matcher,
                responses: responses.into(),
            });
        }
        self
    }

    /// 기록된 모든 호출
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 기록된 호출을 `program arg arg` 형태의 문자열로 반환합니다.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }

    /// 주어진 토큰열을 포함하는 호출 수
    pub fn count_matching(&self, pattern: &[&str]) -> usize {
        let matcher = Matcher::tokens(pattern);
        self.calls().iter().filter(|c| matcher.matches(c)).count()
    }

    fn respond(&self, spec: &CommandSpec) -> MockResponse {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let Ok(mut rules) = self.rules.lock() else {
            return MockResponse::ok("");
        };
        rules
            .iter_mut()
            .find(|r| r.matches(spec))
            .map(Rule::next_response)
            .unwrap_or_else(|| MockResponse::ok(""))
    }
}

impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let mut response = self.respond(spec);
        loop {
            match response {
                MockResponse::Delay(delay, inner) => {
                    match spec.timeout {
                        Some(limit) if limit < delay => {
                            tokio::time::sleep(limit).await;
                            return Err(ExecError::TimedOut {
                                command: spec.display(),
                                timeout: limit,
                            });
                        }
                        _ => tokio::time::sleep(delay).await,
                    }
                    response = *inner;
                }
                MockResponse::Exit {
                    code,
                    stdout,
                    stderr,
                } => {
                    return Ok(CommandOutput {
                        exit_code: code,
                        stdout,
                        stderr,
                        duration: Duration::ZERO,
                    });
                }
                MockResponse::Panic(message) => panic!("{message}"),
                MockResponse::SpawnError(reason) => {
                    return Err(ExecError::Spawn {
                        program: spec.program.clone(),
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unmatched_command_succeeds_with_empty_output() {
        let runner = MockRunner::new();
        let out = runner
            .run(&CommandSpec::new("tofu").arg("init"))
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.is_empty());
        assert_eq!(runner.call_lines(), vec!["tofu init"]);
    }

    #[tokio::test]
    async fn pattern_matches_contiguous_tokens() {
        let runner = MockRunner::new().on(
            &["kms", "keyrings", "describe"],
            MockResponse::fail(1, "NOT_FOUND"),
        );
        let spec = CommandSpec::new("gcloud").args([
            "--project", "p", "kms", "keyrings", "describe", "ring",
        ]);
        let out = runner.run(&spec).await.unwrap();
        assert_eq!(out.exit_code, 1);

        // 같은 토큰이 떨어져 있으면 일치하지 않음
        let spec = CommandSpec::new("gcloud").args(["kms", "keys", "describe"]);
        assert!(runner.run(&spec).await.unwrap().success());
    }

    #[tokio::test]
    async fn sequence_repeats_last_response() {
        let runner = MockRunner::new().on_sequence(
            &["apply"],
            vec![MockResponse::fail(1, "transient"), MockResponse::ok("done")],
        );
        let spec = CommandSpec::new("tofu").arg("apply");
        assert_eq!(runner.run(&spec).await.unwrap().exit_code, 1);
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "done");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "done");
    }

    #[tokio::test]
    async fn run_checked_turns_nonzero_exit_into_error() {
        let runner = MockRunner::new().on(&["plan"], MockResponse::fail(1, "Error: nope"));
        let err = runner
            .run_checked(&CommandSpec::new("tofu").arg("plan"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Failed { code: 1, .. }));
        assert!(err.to_string().contains("Error: nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_longer_than_timeout_times_out() {
        let runner = MockRunner::new().on(
            &["apply"],
            MockResponse::ok("late").delayed(Duration::from_secs(60)),
        );
        let spec = CommandSpec::new("tofu")
            .arg("apply")
            .timeout(Some(Duration::from_secs(1)));
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn predicate_rule_matches_on_working_dir() {
        let runner = MockRunner::new().on_when(
            |spec| spec.dir.as_deref().is_some_and(|d| d.ends_with("bucket")),
            MockResponse::fail(1, "Error 403"),
        );
        let in_bucket = CommandSpec::new("tofu").arg("apply").current_dir("/stage/bucket");
        let elsewhere = CommandSpec::new("tofu").arg("apply").current_dir("/stage/vpc");

        assert_eq!(runner.run(&in_bucket).await.unwrap().exit_code, 1);
        assert!(runner.run(&elsewhere).await.unwrap().success());
    }

    #[tokio::test]
    async fn count_matching_counts_recorded_calls() {
        let runner = MockRunner::new();
        for addr in ["a", "b"] {
            runner
                .run(&CommandSpec::new("tofu").args(["state", "rm", addr]))
                .await
                .unwrap();
        }
        assert_eq!(runner.count_matching(&["state", "rm"]), 2);
        assert_eq!(runner.count_matching(&["state", "rm", "b"]), 1);
    }
}
