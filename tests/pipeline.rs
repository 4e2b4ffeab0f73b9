//! End-to-end pipeline tests against real interpreters. Hosts without
//! python3 skip the python-backed tests instead of failing.

use std::path::PathBuf;
use std::sync::Arc;

use judged::judge::Judge;
use judged::types::{
    ExecutionRequest, JudgeSettings, Language, OverallVerdict, TestCase, Verdict,
};
use judged::utils::gen_random_id;

fn test_root(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("judged-it-{tag}-{}", gen_random_id(8)))
}

fn case(input: &str, expected: &str, visible: bool) -> TestCase {
    TestCase {
        input: input.to_string(),
        expected_output: expected.to_string(),
        visible,
    }
}

fn python_request(source: &str, cases: Vec<TestCase>) -> ExecutionRequest {
    ExecutionRequest {
        language: Language::Python,
        source: source.to_string(),
        test_cases: cases,
    }
}

async fn python3_available() -> bool {
    tokio::process::Command::new("python3")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn python_echo_end_to_end() {
    if !python3_available().await {
        eprintln!("python3 not found, skipping");
        return;
    }
    let root = test_root("echo");
    let judge = Judge::new(root.clone(), JudgeSettings::default());
    let request = python_request(
        "import sys; print(sys.stdin.read().strip())",
        vec![case("5", "5", true)],
    );

    let outcome = judge.grade(&request).await.unwrap();
    assert_eq!(outcome.aggregate.passed, 1);
    assert_eq!(outcome.aggregate.total, 1);
    assert_eq!(outcome.aggregate.overall, OverallVerdict::Accepted);
    assert_eq!(outcome.verdicts[0].actual_output.as_deref(), Some("5"));

    let leftovers = std::fs::read_dir(&root).map(|it| it.count()).unwrap_or(0);
    assert_eq!(leftovers, 0, "workspace must not outlive the request");
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn nonzero_exit_is_runtime_error_not_wrong_answer() {
    if !python3_available().await {
        eprintln!("python3 not found, skipping");
        return;
    }
    let root = test_root("rte");
    let judge = Judge::new(root.clone(), JudgeSettings::default());
    let request = python_request("import sys; sys.exit(2)", vec![case("", "anything", true)]);

    let outcome = judge.grade(&request).await.unwrap();
    assert_eq!(outcome.verdicts[0].verdict, Verdict::RuntimeError);
    assert_eq!(outcome.aggregate.overall, OverallVerdict::RuntimeError);
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn sleeping_program_times_out_and_leaves_no_workspace() {
    if !python3_available().await {
        eprintln!("python3 not found, skipping");
        return;
    }
    let root = test_root("tle");
    let settings = JudgeSettings {
        timeout_ms: 500,
        ..JudgeSettings::default()
    };
    let judge = Judge::new(root.clone(), settings);
    let request = python_request("import time; time.sleep(30)", vec![case("", "", true)]);

    let outcome = judge.grade(&request).await.unwrap();
    assert_eq!(outcome.verdicts[0].verdict, Verdict::TimedOut);

    let leftovers = std::fs::read_dir(&root).map(|it| it.count()).unwrap_or(0);
    assert_eq!(leftovers, 0, "timed-out request leaked a workspace");
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn concurrent_requests_are_isolated() {
    if !python3_available().await {
        eprintln!("python3 not found, skipping");
        return;
    }
    let root = test_root("concurrent");
    let judge = Arc::new(Judge::new(root.clone(), JudgeSettings::default()));

    // each request prints its own sentinel; a cross-contaminated workspace
    // would run some other request's source and fail its expectation
    let mut handles = Vec::new();
    for i in 0..4 {
        let judge = judge.clone();
        handles.push(tokio::spawn(async move {
            let sentinel = format!("sentinel-{i}");
            let request = python_request(
                &format!("print({sentinel:?})"),
                vec![case("", &sentinel, true)],
            );
            judge.grade(&request).await.unwrap()
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.aggregate.overall, OverallVerdict::Accepted);
    }

    let leftovers = std::fs::read_dir(&root).map(|it| it.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn python_compile_free_syntax_error_is_runtime_error() {
    if !python3_available().await {
        eprintln!("python3 not found, skipping");
        return;
    }
    // interpreted languages have no compile stage; a syntax error surfaces
    // when the interpreter exits non-zero
    let root = test_root("syntax");
    let judge = Judge::new(root.clone(), JudgeSettings::default());
    let request = python_request("def broken(:", vec![case("", "", true)]);

    let outcome = judge.grade(&request).await.unwrap();
    assert_eq!(outcome.verdicts[0].verdict, Verdict::RuntimeError);
    assert!(
        outcome.verdicts[0]
            .stderr
            .as_deref()
            .unwrap_or_default()
            .contains("SyntaxError")
    );
    let _ = std::fs::remove_dir_all(&root);
}
