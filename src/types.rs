use std::fmt;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::judge::Judge;

/// Supported submission languages. Lookup is exact-match and case-sensitive:
/// anything that is not one of `javascript`, `python`, `java`, `c`, `cpp`
/// is a caller error, not a system failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
    Java,
    C,
    Cpp,
}

impl Language {
    pub fn parse(value: &str) -> Result<Language, JudgeError> {
        match value {
            "javascript" => Ok(Language::Javascript),
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "c" => Ok(Language::C),
            "cpp" => Ok(Language::Cpp),
            other => Err(JudgeError::LanguageNotSupported(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source: String,
    pub test_cases: Vec<TestCase>,
}

/// How a single child process ended. The runner is total: every invocation
/// resolves to one of these, never to an error escaping the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Ok,
    RuntimeError,
    TimedOut,
    SystemError,
}

impl ExitStatus {
    pub fn as_verdict(&self) -> Verdict {
        match self {
            ExitStatus::Ok => Verdict::Accepted,
            ExitStatus::RuntimeError => Verdict::RuntimeError,
            ExitStatus::TimedOut => Verdict::TimedOut,
            ExitStatus::SystemError => Verdict::SystemError,
        }
    }
}

/// Result of one process run. `stdout`/`stderr` are trimmed text; wall time
/// is measured around spawn-to-exit, never estimated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
    pub wall_time_ms: u64,
}

impl ExecutionOutcome {
    pub fn system_error(message: String, wall_time_ms: u64) -> Self {
        ExecutionOutcome {
            stdout: String::new(),
            stderr: message,
            status: ExitStatus::SystemError,
            wall_time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    RuntimeError,
    TimedOut,
    CompilationError,
    SystemError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallVerdict {
    Accepted,
    WrongAnswer,
    RuntimeError,
    TimedOut,
    CompilationError,
    SystemError,
    NoTestCases,
}

impl OverallVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallVerdict::Accepted => "Accepted",
            OverallVerdict::WrongAnswer => "WrongAnswer",
            OverallVerdict::RuntimeError => "RuntimeError",
            OverallVerdict::TimedOut => "TimedOut",
            OverallVerdict::CompilationError => "CompilationError",
            OverallVerdict::SystemError => "SystemError",
            OverallVerdict::NoTestCases => "NoTestCases",
        }
    }
}

impl From<Verdict> for OverallVerdict {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Accepted => OverallVerdict::Accepted,
            Verdict::WrongAnswer => OverallVerdict::WrongAnswer,
            Verdict::RuntimeError => OverallVerdict::RuntimeError,
            Verdict::TimedOut => OverallVerdict::TimedOut,
            Verdict::CompilationError => OverallVerdict::CompilationError,
            Verdict::SystemError => OverallVerdict::SystemError,
        }
    }
}

/// One test case's outcome, in input order. Detail fields are `Option` so a
/// redacted view can omit them from the serialized response entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseVerdict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub verdict: Verdict,
    pub wall_time_ms: u64,
    pub visible: bool,
}

impl CaseVerdict {
    /// Hidden cases keep only verdict and timing. Stderr goes too, since a
    /// runtime's error message can echo hidden input back at the caller.
    pub fn redacted(&self) -> CaseVerdict {
        if self.visible {
            return self.clone();
        }
        CaseVerdict {
            input: None,
            expected_output: None,
            actual_output: None,
            stderr: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub passed: usize,
    pub total: usize,
    pub overall: OverallVerdict,
}

/// Full (non-redacted) result of one judged request. This is what the
/// persistence collaborator stores; `redacted` derives the caller view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgeOutcome {
    pub verdicts: Vec<CaseVerdict>,
    pub aggregate: AggregateResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_stderr: Option<String>,
}

impl JudgeOutcome {
    pub fn redacted(&self) -> JudgeOutcome {
        JudgeOutcome {
            verdicts: self.verdicts.iter().map(CaseVerdict::redacted).collect(),
            aggregate: self.aggregate,
            // compile stderr is not a hidden-case secret
            compile_stderr: self.compile_stderr.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("language not supported: {0}")]
    LanguageNotSupported(String),
    #[error("source code is empty")]
    EmptySource,
    #[error("filesystem error: {0}")]
    Filesystem(String),
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error("judge worker pool is unavailable")]
    Unavailable,
}

fn default_port() -> u16 {
    8080
}

fn default_workspace_root() -> String {
    "/tmp/judged".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_compile_timeout_ms() -> u64 {
    10_000
}

fn default_max_output_bytes() -> usize {
    1 << 20
}

fn default_max_concurrent_requests() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl AppConfig {
    pub fn judge_settings(&self) -> JudgeSettings {
        JudgeSettings {
            timeout_ms: self.timeout_ms,
            compile_timeout_ms: self.compile_timeout_ms,
            max_output_bytes: self.max_output_bytes,
            max_concurrent_requests: self.max_concurrent_requests,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JudgeSettings {
    /// Per-test-case wall-clock limit.
    pub timeout_ms: u64,
    pub compile_timeout_ms: u64,
    /// Hard cap on captured stdout/stderr bytes per stream.
    pub max_output_bytes: usize,
    pub max_concurrent_requests: usize,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        JudgeSettings {
            timeout_ms: default_timeout_ms(),
            compile_timeout_ms: default_compile_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub judge: Arc<Judge>,
    pub prometheus_handle: PrometheusHandle,
}
