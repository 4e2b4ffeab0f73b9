use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time;

use crate::runner::{CommandRunner, ProcessRunner, RunSpec};
use crate::toolchain::{CommandTemplate, Toolchain};
use crate::types::{
    AggregateResult, CaseVerdict, ExecutionOutcome, ExecutionRequest, ExitStatus, JudgeError,
    JudgeOutcome, JudgeSettings, Language, OverallVerdict, TestCase, Verdict,
};
use crate::workspace::{Workspace, WorkspaceManager};

/// Orchestrates workspace, toolchain, and runner across a batch of test
/// cases: validate, take a pool permit, materialize the source, compile once,
/// run every case sequentially, aggregate, clean up.
pub struct Judge<R: CommandRunner = ProcessRunner> {
    workspaces: WorkspaceManager,
    runner: R,
    settings: JudgeSettings,
    permits: Semaphore,
}

impl Judge<ProcessRunner> {
    pub fn new(workspace_root: impl Into<PathBuf>, settings: JudgeSettings) -> Self {
        Judge::with_runner(workspace_root, settings, ProcessRunner)
    }
}

impl<R: CommandRunner> Judge<R> {
    pub fn with_runner(
        workspace_root: impl Into<PathBuf>,
        settings: JudgeSettings,
        runner: R,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_requests);
        Judge {
            workspaces: WorkspaceManager::new(workspace_root),
            runner,
            settings,
            permits,
        }
    }

    /// Interactive "Run": visible cases only, full detail in every verdict.
    pub async fn preview(
        &self,
        request: &ExecutionRequest,
    ) -> Result<Vec<CaseVerdict>, JudgeError> {
        let visible: Vec<TestCase> = request
            .test_cases
            .iter()
            .filter(|case| case.visible)
            .cloned()
            .collect();
        let outcome = self
            .run_cases(request.language, &request.source, &visible)
            .await?;
        Ok(outcome.verdicts)
    }

    /// Graded "Submit": every case. The returned outcome is the full view for
    /// persistence; callers facing untrusted users apply `redacted()`.
    pub async fn grade(&self, request: &ExecutionRequest) -> Result<JudgeOutcome, JudgeError> {
        self.run_cases(request.language, &request.source, &request.test_cases)
            .await
    }

    async fn run_cases(
        &self,
        language: Language,
        source: &str,
        cases: &[TestCase],
    ) -> Result<JudgeOutcome, JudgeError> {
        if source.trim().is_empty() {
            return Err(JudgeError::EmptySource);
        }
        if cases.is_empty() {
            return Ok(JudgeOutcome {
                verdicts: Vec::new(),
                aggregate: AggregateResult {
                    passed: 0,
                    total: 0,
                    overall: OverallVerdict::NoTestCases,
                },
                compile_stderr: None,
            });
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| JudgeError::Unavailable)?;

        // Overall deadline bounds every blocking step, filesystem included,
        // so a wedged host cannot hang a worker indefinitely.
        let deadline = Duration::from_millis(
            self.settings.compile_timeout_ms
                + cases.len() as u64 * self.settings.timeout_ms
                + 2_000,
        );
        time::timeout(deadline, self.run_cases_inner(language, source, cases))
            .await
            .map_err(|_| JudgeError::DeadlineExceeded)?
    }

    async fn run_cases_inner(
        &self,
        language: Language,
        source: &str,
        cases: &[TestCase],
    ) -> Result<JudgeOutcome, JudgeError> {
        let toolchain = Toolchain::for_language(language);
        // Workspace removal on every exit path below is the Drop guard's job;
        // the happy path releases explicitly.
        let workspace = self.workspaces.acquire().await?;
        workspace.write(toolchain.source_file, source).await?;

        let mut compile_stderr = None;
        if let Some(compile) = &toolchain.compile {
            let outcome = self
                .invoke(compile, &workspace, Vec::new(), self.settings.compile_timeout_ms)
                .await;
            match outcome.status {
                ExitStatus::Ok => {
                    if !outcome.stderr.is_empty() {
                        compile_stderr = Some(outcome.stderr);
                    }
                }
                ExitStatus::RuntimeError => {
                    // Compilation happens once per request; every case is
                    // marked without ever invoking the run command. The
                    // compiler's stderr rides on each verdict too, so callers
                    // that only see verdicts (the interactive Run path) still
                    // get the message.
                    tracing::info!(%language, "compilation failed");
                    let verdicts =
                        blanket_verdicts(cases, Verdict::CompilationError, Some(&outcome.stderr));
                    let aggregate = aggregate_of(&verdicts);
                    workspace.release().await;
                    return Ok(JudgeOutcome {
                        verdicts,
                        aggregate,
                        compile_stderr: Some(outcome.stderr),
                    });
                }
                ExitStatus::TimedOut | ExitStatus::SystemError => {
                    // A hung or missing compiler is a host problem, not a
                    // candidate-code problem.
                    tracing::error!(%language, status = ?outcome.status, "compiler did not complete");
                    let verdicts =
                        blanket_verdicts(cases, Verdict::SystemError, Some(&outcome.stderr));
                    let aggregate = aggregate_of(&verdicts);
                    workspace.release().await;
                    return Ok(JudgeOutcome {
                        verdicts,
                        aggregate,
                        compile_stderr: Some(outcome.stderr),
                    });
                }
            }
        }

        let mut verdicts = Vec::with_capacity(cases.len());
        for case in cases {
            let outcome = self
                .invoke(
                    &toolchain.run,
                    &workspace,
                    case.input.clone().into_bytes(),
                    self.settings.timeout_ms,
                )
                .await;
            verdicts.push(classify(case, outcome));
        }

        let aggregate = aggregate_of(&verdicts);
        workspace.release().await;
        Ok(JudgeOutcome {
            verdicts,
            aggregate,
            compile_stderr,
        })
    }

    async fn invoke(
        &self,
        template: &CommandTemplate,
        workspace: &Workspace,
        stdin: Vec<u8>,
        timeout_ms: u64,
    ) -> ExecutionOutcome {
        self.runner
            .run(RunSpec {
                program: template.program.to_string(),
                args: template.args.iter().map(|arg| arg.to_string()).collect(),
                cwd: workspace.path().to_path_buf(),
                stdin,
                timeout: Duration::from_millis(timeout_ms),
                max_output_bytes: self.settings.max_output_bytes,
            })
            .await
    }
}

/// Exact-trimmed-string equality is the comparison law; no whitespace
/// collapsing, case folding, or numeric tolerance.
fn classify(case: &TestCase, outcome: ExecutionOutcome) -> CaseVerdict {
    let verdict = match outcome.status {
        ExitStatus::Ok if outcome.stdout.trim() == case.expected_output.trim() => Verdict::Accepted,
        ExitStatus::Ok => Verdict::WrongAnswer,
        other => other.as_verdict(),
    };
    CaseVerdict {
        input: Some(case.input.clone()),
        expected_output: Some(case.expected_output.clone()),
        actual_output: Some(outcome.stdout),
        stderr: Some(outcome.stderr),
        verdict,
        wall_time_ms: outcome.wall_time_ms,
        visible: case.visible,
    }
}

fn blanket_verdicts(cases: &[TestCase], verdict: Verdict, stderr: Option<&str>) -> Vec<CaseVerdict> {
    cases
        .iter()
        .map(|case| CaseVerdict {
            input: Some(case.input.clone()),
            expected_output: Some(case.expected_output.clone()),
            actual_output: None,
            stderr: stderr.map(str::to_string),
            verdict,
            wall_time_ms: 0,
            visible: case.visible,
        })
        .collect()
}

fn aggregate_of(verdicts: &[CaseVerdict]) -> AggregateResult {
    let total = verdicts.len();
    let passed = verdicts
        .iter()
        .filter(|v| v.verdict == Verdict::Accepted)
        .count();
    let overall = if total == 0 {
        OverallVerdict::NoTestCases
    } else {
        verdicts
            .iter()
            .find(|v| v.verdict != Verdict::Accepted)
            .map(|v| v.verdict.into())
            .unwrap_or(OverallVerdict::Accepted)
    };
    AggregateResult {
        passed,
        total,
        overall,
    }
}
